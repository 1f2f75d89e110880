pub mod connection;
pub mod migrations;
pub mod item_repo;
pub mod habit_repo;
pub mod task_repo;
pub mod completion_repo;
pub mod project_repo;

pub use connection::*;
