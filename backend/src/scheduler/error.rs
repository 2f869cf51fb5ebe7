//! Error types for the scheduler.

use super::constraints::ConstraintError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors raised while loading the observation pool or ranking it.
///
/// A vetoed candidate or an empty schedule is never an error.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Field list error: {0}")]
    FieldList(String),

    #[error("No field list source configured")]
    NoFieldList,

    #[error("Duplicate observation in field list: {0}")]
    DuplicateObservation(String),

    #[error("Invalid observation {name}: {reason}")]
    InvalidObservation { name: String, reason: String },

    #[error("Unknown observation: {0}")]
    UnknownObservation(String),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}
