//! Handlers on the shutdown path.

use super::StateName;
use crate::state::handler::{guarded, Outcome, StateHandler};
use crate::state::model::Model;

/// Parks the mount. This is the safe state; a failure here is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parking;

impl StateHandler for Parking {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            model.say("Parking the mount");
            model.observatory.park()?;
            Ok(StateName::Parked)
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Parked;

impl StateHandler for Parked {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            model.say("Observatory parked");
            Ok(StateName::Housekeeping)
        })
    }
}

/// Cleans up tonight's frames and forgets tonight's visits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Housekeeping;

impl StateHandler for Housekeeping {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            model.say("Performing housekeeping");
            model.observatory.cleanup_observations()?;
            model.scheduler.reset_observed_list();
            Ok(StateName::Sleeping)
        })
    }
}
