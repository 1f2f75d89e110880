pub mod rollback;
pub mod materialize;
pub mod habit_generator;
pub mod step_progression;
pub mod stats;
pub mod task_events;

pub use habit_generator::{HabitGenerator, RegenerationStatus, RegenerationSummary, SourceFailure};
pub use stats::CompletionRate;
pub use step_progression::StepProgression;
pub use task_events::{TaskEvents, TaskUpdate};
