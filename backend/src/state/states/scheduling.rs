use log::debug;

use super::StateName;
use crate::state::handler::{guarded, Outcome, StateHandler};
use crate::state::model::Model;

/// Asks the scheduler for the next target.
///
/// An empty schedule is a normal outcome and leads to `parking`.
#[derive(Debug, Clone, Copy)]
pub struct Scheduling {
    /// Reload the field list on every tick when a source is configured.
    pub reread_field_list: bool,
}

impl Default for Scheduling {
    fn default() -> Self {
        Self {
            reread_field_list: true,
        }
    }
}

impl StateHandler for Scheduling {
    fn on_enter(&self, model: &mut Model<'_>) -> Outcome {
        guarded(model, |model| {
            let reread = self.reread_field_list && model.scheduler.has_field_list();
            let now = model.observatory.now();
            debug!("Scheduling at {}", now);

            let ranked = model.scheduler.get_observation(Some(now), false, reread)?;
            match ranked.first() {
                Some(top) => {
                    model.say(format!(
                        "Got next observation: {} (merit {:.3})",
                        top.name, top.merit
                    ));
                    Ok(StateName::Slewing)
                }
                None => {
                    model.say("No valid observations found, heading to park");
                    Ok(StateName::Parking)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FieldListFile;
    use crate::state::testing::Harness;

    #[test]
    fn test_selects_observation() {
        let mut harness = Harness::new();
        let (outcome, _) = harness.enter(StateName::Scheduling, &Scheduling::default());
        assert_eq!(outcome, Outcome::Success(StateName::Slewing));
        assert_eq!(
            harness.scheduler.current_observation().unwrap().name,
            Harness::TARGET
        );
        assert!(harness.notifier.contains("Got next observation"));
    }

    #[test]
    fn test_exhaustion_parks() {
        let mut harness = Harness::new();
        harness.scheduler.mark_observed(Harness::TARGET);
        let (outcome, next) = harness.enter(StateName::Scheduling, &Scheduling::default());
        assert_eq!(outcome, Outcome::Success(StateName::Parking));
        assert_eq!(next, Some(StateName::Parking));
        assert!(harness.notifier.contains("No valid observations"));
        assert!(harness.scheduler.current_observation().is_none());
    }

    #[test]
    fn test_broken_field_list_fails() {
        let mut harness = Harness::new();
        let scheduler = std::mem::replace(&mut harness.scheduler, Harness::scheduler());
        harness.scheduler = scheduler.with_field_list(FieldListFile::new("/nonexistent/fields.toml"));

        let (outcome, next) = harness.enter(StateName::Scheduling, &Scheduling::default());
        assert!(matches!(outcome, Outcome::Failure(ref r) if r.contains("Failed to read")));
        assert_eq!(next, Some(StateName::Parking));

        let (outcome, _) = harness.enter(
            StateName::Scheduling,
            &Scheduling {
                reread_field_list: false,
            },
        );
        assert_eq!(outcome, Outcome::Success(StateName::Slewing));
    }
}
