pub mod recurrence;
pub mod streak;
