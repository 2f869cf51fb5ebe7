//! Fatal state machine errors.

use super::graph::StateName;

/// Errors that stop the engine.
///
/// Handler failures are not in here: they are routed to the safe state and
/// only become fatal when the safe state itself fails.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: StateName, to: StateName },

    #[error("No handler registered for state {0}")]
    MissingHandler(StateName),

    #[error("Invalid state graph: {0}")]
    InvalidGraph(String),

    #[error("Safe state {state} failed: {reason}")]
    SafeStateFailure { state: StateName, reason: String },
}
