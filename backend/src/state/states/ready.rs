use super::StateName;
use crate::state::handler::{guarded, Outcome, StateHandler};
use crate::state::model::Model;

/// Brings the observatory online.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ready;

impl StateHandler for Ready {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            model.say("Getting ready for the night");
            model.observatory.initialize()?;

            if model.observatory.take_flat_fields() {
                Ok(StateName::Calibrating)
            } else {
                Ok(StateName::Scheduling)
            }
        })
    }
}
