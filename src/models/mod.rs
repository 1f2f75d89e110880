pub mod habit;
pub mod task;
pub mod project;
pub mod completion;

pub use habit::*;
pub use task::*;
pub use project::*;
pub use completion::*;
