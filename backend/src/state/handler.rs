//! Contract between the engine and the per-state handlers.

use log::warn;

use super::graph::StateName;
use super::model::Model;
use crate::hardware::HardwareError;
use crate::scheduler::SchedulerError;

/// What a handler reports back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Work done, continue with the given successor.
    Success(StateName),
    /// Work failed; the engine takes the state's fallback.
    Failure(String),
}

/// Errors a handler's privileged work may raise. Never leaves the handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("No current observation")]
    NoCurrentObservation,

    #[error("No exposure to analyze")]
    NoExposure,
}

pub trait StateHandler: Send + Sync {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome;

    fn on_exit(&self, _model: &mut Model<'_>) {}
}

/// Runs `work` under the fail-safe handler template.
///
/// `next_state` is first set to the state's fallback; it is overwritten with
/// the nominal successor only once `work` has succeeded. Errors are logged
/// and announced but never propagated.
pub fn guarded<F>(model: &mut Model<'_>, work: F) -> Outcome
where
    F: FnOnce(&mut Model<'_>) -> Result<StateName, HandlerError>,
{
    model.next_state = model.fallback;

    match work(model) {
        Ok(next) => {
            model.next_state = Some(next);
            Outcome::Success(next)
        }
        Err(e) => {
            warn!("Problem in state {}: {}", model.current_state, e);
            model.say(format!("Problem in state {}: {}", model.current_state, e));
            Outcome::Failure(e.to_string())
        }
    }
}
