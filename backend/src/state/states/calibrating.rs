use super::StateName;
use crate::state::handler::{guarded, Outcome, StateHandler};
use crate::state::model::Model;

/// Takes twilight flat fields before the night starts.
///
/// Flats are only taken while the Sun sits between the civil and the
/// astronomical horizon of the site; once it is below the astronomical
/// horizon the sky is too dark and calibration is skipped. Either way the
/// nominal successor is `scheduling`.
///
/// The handler follows the template every state uses:
///
/// 1. `next_state` starts at the state's fallback (`parking`);
/// 2. the observatory and the Sun are queried to decide whether flats are
///    warranted;
/// 3. the calibration sequence runs if they are;
/// 4. only then is `next_state` moved to `scheduling`;
/// 5. a failure anywhere above is logged and announced, leaving `next_state`
///    at the fallback.
///
/// Steps 1, 4 and 5 live in [`guarded`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Calibrating;

impl StateHandler for Calibrating {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            if model.observatory.take_flat_fields() {
                let observer = model.observatory.observer();
                let civil_horizon = observer.civil_horizon;
                let astro_horizon = observer.astro_horizon;

                let now = model.observatory.now();
                let sun_altitude = model.observatory.sun_altitude(now);

                if sun_altitude <= civil_horizon && sun_altitude > astro_horizon {
                    model.say("Taking some flat fields to start the night");
                    model.observatory.perform_calibration_sequence()?;
                } else if sun_altitude <= astro_horizon {
                    model.say(format!(
                        "Sun is below {} degrees, stopping calibration",
                        astro_horizon.value()
                    ));
                }
            }

            Ok(StateName::Scheduling)
        })
    }
}
