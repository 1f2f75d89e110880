use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotInitialized,
    HabitNotFound,
    TaskNotFound,
    ProjectNotFound,
    StepNotFound,
    AmbiguousRef,
    InvalidRule,
    InvalidStatusTransition,
    ProjectNameConflict,
    DuplicateInstance,
    ValidationError,
    DatabaseError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::HabitNotFound => "HABIT_NOT_FOUND",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::StepNotFound => "STEP_NOT_FOUND",
            Self::AmbiguousRef => "AMBIGUOUS_REF",
            Self::InvalidRule => "INVALID_RULE",
            Self::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
            Self::ProjectNameConflict => "PROJECT_NAME_CONFLICT",
            Self::DuplicateInstance => "DUPLICATE_INSTANCE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct CadenceError {
    pub code: ErrorCode,
    pub message: String,
}

impl CadenceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_initialized() -> Self {
        Self::new(
            ErrorCode::NotInitialized,
            "cadence is not initialized. Run `cadence init` first.",
        )
    }

    pub fn habit_not_found(reference: &str) -> Self {
        Self::new(
            ErrorCode::HabitNotFound,
            format!("Habit not found: {reference}"),
        )
    }

    pub fn task_not_found(reference: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {reference}"),
        )
    }

    pub fn project_not_found(reference: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {reference}"),
        )
    }

    pub fn step_not_found(reference: &str) -> Self {
        Self::new(
            ErrorCode::StepNotFound,
            format!("No project step is linked to task {reference}"),
        )
    }

    pub fn ambiguous_ref(reference: &str, candidates: &[String]) -> Self {
        Self::new(
            ErrorCode::AmbiguousRef,
            format!(
                "Ambiguous reference '{}'. Candidates: {}",
                reference,
                candidates.join(", ")
            ),
        )
    }

    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRule, message)
    }

    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::new(
            ErrorCode::InvalidStatusTransition,
            format!("Invalid status transition: {from} → {to}"),
        )
    }

    pub fn project_name_conflict(name: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNameConflict,
            format!("Project with name '{name}' already exists"),
        )
    }

    pub fn duplicate_instance(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateInstance, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Prefix the message with what was being attempted, keeping the code.
    pub fn context(self, what: impl std::fmt::Display) -> Self {
        Self::new(self.code, format!("{what}: {}", self.message))
    }
}

impl From<rusqlite::Error> for CadenceError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Self::duplicate_instance(e.to_string())
            }
            _ => Self::database(e.to_string()),
        }
    }
}
