//! Handlers that work on the current observation.

use log::debug;

use super::StateName;
use crate::models::Observation;
use crate::state::handler::{guarded, HandlerError, Outcome, StateHandler};
use crate::state::model::Model;

fn current(model: &Model<'_>) -> Result<Observation, HandlerError> {
    model
        .scheduler
        .current_observation()
        .cloned()
        .ok_or(HandlerError::NoCurrentObservation)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Slewing;

impl StateHandler for Slewing {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            let observation = current(model)?;
            model.say(format!("Slewing to {}", observation.name));
            model.observatory.slew_to(&observation)?;
            Ok(StateName::Pointing)
        })
    }
}

/// Takes a pointing frame of the new target. No correction is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pointing;

impl StateHandler for Pointing {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            let observation = current(model)?;
            let record = model.observatory.take_pointing_image(&observation)?;
            debug!("Pointing image for {}: {}", observation.name, record.path.display());
            Ok(StateName::Observing)
        })
    }
}

/// Takes one science exposure of the current observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observing;

impl StateHandler for Observing {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            let observation = current(model)?;
            model.last_exposure = None;
            let record = model.observatory.observe(&observation)?;
            model.last_exposure = Some(record);
            Ok(StateName::Analyzing)
        })
    }
}

/// Books the last exposure and decides whether to keep observing.
///
/// Goes back to `scheduling` when the observation is complete, at the end of
/// every exposure set, or when the target will not last another exposure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzing;

impl StateHandler for Analyzing {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            let record = model.last_exposure.take().ok_or(HandlerError::NoExposure)?;
            let name = current(model)?.name;
            let observation = model.scheduler.record_exposure(&name)?.clone();
            debug!(
                "Frame {} of {}: {}",
                observation.current_exposure,
                name,
                record.path.display()
            );

            if observation.is_complete() {
                model.scheduler.mark_observed(&name);
                model.scheduler.set_current_observation(None)?;
                model.say(format!(
                    "Observation {} complete after {} exposures",
                    name, observation.current_exposure
                ));
                return Ok(StateName::Scheduling);
            }

            if observation.set_is_finished() {
                debug!("Exposure set of {} finished", name);
                return Ok(StateName::Scheduling);
            }

            let until = model.observatory.now() + observation.exposure.exposure_time;
            if !model
                .observatory
                .observation_still_available(&observation, until)
            {
                model.say(format!("{} is no longer observable", name));
                return Ok(StateName::Scheduling);
            }

            Ok(StateName::Observing)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{MountState, Observatory, Operation};
    use crate::state::testing::Harness;

    fn tracking() -> Harness {
        let mut harness = Harness::new();
        harness.observatory.initialize().unwrap();
        harness
            .scheduler
            .set_current_observation(Some(Harness::TARGET))
            .unwrap();
        let (outcome, _) = harness.enter(StateName::Slewing, &Slewing);
        assert_eq!(outcome, Outcome::Success(StateName::Pointing));
        harness
    }

    #[test]
    fn test_slewing_requires_current_observation() {
        let mut harness = Harness::new();
        let (outcome, next) = harness.enter(StateName::Slewing, &Slewing);
        assert_eq!(outcome, Outcome::Failure("No current observation".to_string()));
        assert_eq!(next, Some(StateName::Parking));
    }

    #[test]
    fn test_slew_point_observe_analyze() {
        let mut harness = tracking();
        assert_eq!(
            harness.observatory.mount(),
            &MountState::Tracking(Harness::TARGET.to_string())
        );

        let (outcome, _) = harness.enter(StateName::Pointing, &Pointing);
        assert_eq!(outcome, Outcome::Success(StateName::Observing));

        let (outcome, _) = harness.enter(StateName::Observing, &Observing);
        assert_eq!(outcome, Outcome::Success(StateName::Analyzing));
        assert!(harness.last_exposure.is_some());

        let (outcome, _) = harness.enter(StateName::Analyzing, &Analyzing);
        assert_eq!(outcome, Outcome::Success(StateName::Observing));
        assert!(harness.last_exposure.is_none());
        assert_eq!(
            harness
                .scheduler
                .observation(Harness::TARGET)
                .unwrap()
                .current_exposure,
            1
        );
    }

    #[test]
    fn test_analyzing_without_exposure_fails() {
        let mut harness = tracking();
        let (outcome, _) = harness.enter(StateName::Analyzing, &Analyzing);
        assert_eq!(outcome, Outcome::Failure("No exposure to analyze".to_string()));
    }

    #[test]
    fn test_set_boundary_and_completion_reschedule() {
        let mut harness = tracking();
        let exposure = harness.observation().exposure;
        let per_set = exposure.exposures_per_set;

        for _ in 1..per_set {
            harness.enter(StateName::Observing, &Observing);
            let (outcome, _) = harness.enter(StateName::Analyzing, &Analyzing);
            assert_eq!(outcome, Outcome::Success(StateName::Observing));
        }
        harness.enter(StateName::Observing, &Observing);
        let (outcome, _) = harness.enter(StateName::Analyzing, &Analyzing);
        assert_eq!(outcome, Outcome::Success(StateName::Scheduling));

        while harness.observation().current_exposure + 1 < exposure.min_exposures {
            harness.enter(StateName::Observing, &Observing);
            harness.enter(StateName::Analyzing, &Analyzing);
        }
        harness.enter(StateName::Observing, &Observing);
        let (outcome, _) = harness.enter(StateName::Analyzing, &Analyzing);
        assert_eq!(outcome, Outcome::Success(StateName::Scheduling));
        assert_eq!(harness.scheduler.observed_list(), &[Harness::TARGET.to_string()]);
        assert!(harness.scheduler.current_observation().is_none());
        assert!(harness.notifier.contains("complete after"));
    }

    #[test]
    fn test_exposure_failure_falls_back() {
        let mut harness = tracking();
        harness.observatory.inject_fault(Operation::Observe);
        let (outcome, next) = harness.enter(StateName::Observing, &Observing);
        assert!(matches!(outcome, Outcome::Failure(_)));
        assert_eq!(next, Some(StateName::Parking));
        assert!(harness.last_exposure.is_none());
    }
}
