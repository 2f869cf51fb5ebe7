//! Scoring rules applied to every candidate observation on each tick.
//!
//! A constraint either vetoes a candidate outright or contributes a score to
//! its merit. Constraints hold configuration only; any per-tick state they
//! need arrives through [`CommonProperties`].

use qtty::Degrees;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::CommonProperties;
use crate::astro::Observer;
use crate::models::{ModifiedJulianDate, Observation};

/// Outcome of evaluating one constraint against one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintScore {
    pub veto: bool,
    pub value: f64,
}

impl ConstraintScore {
    pub fn veto() -> Self {
        Self {
            veto: true,
            value: 0.0,
        }
    }

    pub fn score(value: f64) -> Self {
        Self { veto: false, value }
    }
}

/// A constraint could not produce a score.
///
/// This signals a configuration defect rather than a scheduling outcome, so the
/// scheduler propagates it instead of treating the candidate as vetoed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Constraint {constraint} failed on {observation}: {message}")]
pub struct ConstraintError {
    pub constraint: String,
    pub observation: String,
    pub message: String,
}

impl ConstraintError {
    pub fn new(
        constraint: impl Into<String>,
        observation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            constraint: constraint.into(),
            observation: observation.into(),
            message: message.into(),
        }
    }
}

/// Trait for constraints evaluated by the scheduler
pub trait Constraint: Send + Sync {
    fn name(&self) -> &str;

    fn score(
        &self,
        time: ModifiedJulianDate,
        observer: &Observer,
        observation: &Observation,
        common: &CommonProperties,
    ) -> Result<ConstraintScore, ConstraintError>;
}

impl fmt::Debug for dyn Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constraint({})", self.name())
    }
}

/// Requires enough night left to reach the observation's minimum exposure
/// count, with the target still above the horizon at that point.
///
/// Scores the fraction of the remaining night left over afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Duration {
    pub weight: f64,
}

impl Constraint for Duration {
    fn name(&self) -> &str {
        "Duration"
    }

    fn score(
        &self,
        time: ModifiedJulianDate,
        observer: &Observer,
        observation: &Observation,
        common: &CommonProperties,
    ) -> Result<ConstraintScore, ConstraintError> {
        let remaining = common.end_of_night - time;
        if remaining.value() <= 0.0 {
            return Ok(ConstraintScore::veto());
        }

        let finish = time + observation.minimum_duration();
        if finish > common.end_of_night {
            return Ok(ConstraintScore::veto());
        }

        if let Some(target) = &observation.target {
            if !observer.target_is_up(target, finish, observer.horizon) {
                return Ok(ConstraintScore::veto());
            }
        }

        let spare = common.end_of_night - finish;
        Ok(ConstraintScore::score(
            self.weight * spare.value() / remaining.value(),
        ))
    }
}

/// Vetoes targets below `minimum` (the observer horizon when unset) and
/// favours higher altitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct Altitude {
    pub weight: f64,
    pub minimum: Option<Degrees>,
}

impl Constraint for Altitude {
    fn name(&self) -> &str {
        "Altitude"
    }

    fn score(
        &self,
        time: ModifiedJulianDate,
        observer: &Observer,
        observation: &Observation,
        _common: &CommonProperties,
    ) -> Result<ConstraintScore, ConstraintError> {
        let Some(target) = &observation.target else {
            return Ok(ConstraintScore::score(0.0));
        };

        let altitude = observer.altitude(target, time);
        if altitude < self.minimum.unwrap_or(observer.horizon) {
            return Ok(ConstraintScore::veto());
        }

        Ok(ConstraintScore::score(
            self.weight * altitude.value() / 90.0,
        ))
    }
}

/// Vetoes observations carrying a fixed window that does not contain `time`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow;

impl Constraint for TimeWindow {
    fn name(&self) -> &str {
        "TimeWindow"
    }

    fn score(
        &self,
        time: ModifiedJulianDate,
        _observer: &Observer,
        observation: &Observation,
        _common: &CommonProperties,
    ) -> Result<ConstraintScore, ConstraintError> {
        match &observation.fixed_window {
            Some(window) if !window.contains(time) => Ok(ConstraintScore::veto()),
            _ => Ok(ConstraintScore::score(0.0)),
        }
    }
}

/// Vetoes observations already completed tonight.
#[derive(Debug, Clone, PartialEq)]
pub struct AlreadyVisited;

impl Constraint for AlreadyVisited {
    fn name(&self) -> &str {
        "AlreadyVisited"
    }

    fn score(
        &self,
        _time: ModifiedJulianDate,
        _observer: &Observer,
        observation: &Observation,
        common: &CommonProperties,
    ) -> Result<ConstraintScore, ConstraintError> {
        if common.has_observed(&observation.name) {
            Ok(ConstraintScore::veto())
        } else {
            Ok(ConstraintScore::score(0.0))
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Constraint entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintConfig {
    Duration {
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Altitude {
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default)]
        minimum: Option<f64>,
    },
    TimeWindow,
    AlreadyVisited,
}

impl ConstraintConfig {
    /// Constraint list used when the configuration does not name one.
    pub fn defaults() -> Vec<ConstraintConfig> {
        vec![
            ConstraintConfig::TimeWindow,
            ConstraintConfig::AlreadyVisited,
            ConstraintConfig::Altitude {
                weight: default_weight(),
                minimum: None,
            },
            ConstraintConfig::Duration {
                weight: default_weight(),
            },
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ConstraintConfig::Duration { weight } | ConstraintConfig::Altitude { weight, .. } => {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(format!("constraint weight must be finite and >= 0, got {}", weight));
                }
            }
            ConstraintConfig::TimeWindow | ConstraintConfig::AlreadyVisited => {}
        }
        if let ConstraintConfig::Altitude {
            minimum: Some(minimum),
            ..
        } = self
        {
            if !(-90.0..=90.0).contains(minimum) {
                return Err(format!("altitude minimum {} outside [-90, 90]", minimum));
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Box<dyn Constraint> {
        match self {
            ConstraintConfig::Duration { weight } => Box::new(Duration { weight: *weight }),
            ConstraintConfig::Altitude { weight, minimum } => Box::new(Altitude {
                weight: *weight,
                minimum: minimum.map(Degrees::new),
            }),
            ConstraintConfig::TimeWindow => Box::new(TimeWindow),
            ConstraintConfig::AlreadyVisited => Box::new(AlreadyVisited),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExposurePlan, Period};
    use qtty::Seconds;

    fn site() -> Observer {
        Observer::new("equator", 0.0, 0.0)
    }

    fn common(end_of_night: f64) -> CommonProperties {
        CommonProperties {
            end_of_night: ModifiedJulianDate::new(end_of_night),
            observed_list: vec!["done".to_string()],
        }
    }

    fn short_plan() -> ExposurePlan {
        ExposurePlan {
            exposure_time: Seconds::new(60.0),
            min_exposures: 10,
            exposures_per_set: 5,
        }
    }

    #[test]
    fn test_duration_vetoes_when_night_too_short() {
        let time = ModifiedJulianDate::new(60000.0);
        let obs = Observation::new("late", 0.0).with_exposure(short_plan());
        // 600 s needed, only ~430 s of night left
        let score = Duration { weight: 1.0 }
            .score(time, &site(), &obs, &common(60000.005))
            .unwrap();
        assert!(score.veto);
    }

    #[test]
    fn test_duration_scores_spare_fraction() {
        let time = ModifiedJulianDate::new(60000.0);
        let obs = Observation::new("early", 0.0).with_exposure(short_plan());
        let score = Duration { weight: 2.0 }
            .score(time, &site(), &obs, &common(60000.2))
            .unwrap();
        assert!(!score.veto);
        let remaining = 0.2 * 86400.0;
        let expected = 2.0 * (remaining - 600.0) / remaining;
        assert!((score.value - expected).abs() < 1e-6);
    }

    #[test]
    fn test_duration_vetoes_after_end_of_night() {
        let time = ModifiedJulianDate::new(60000.3);
        let obs = Observation::new("x", 0.0).with_exposure(short_plan());
        let score = Duration { weight: 1.0 }
            .score(time, &site(), &obs, &common(60000.2))
            .unwrap();
        assert!(score.veto);
    }

    #[test]
    fn test_altitude_vetoes_low_targets() {
        let observer = site();
        let time = ModifiedJulianDate::new(60000.0);
        let lst = observer.local_sidereal_degrees(time);

        let overhead = Observation::new("zenith", 0.0).with_target(lst, 0.0);
        let score = Altitude {
            weight: 1.0,
            minimum: None,
        }
        .score(time, &observer, &overhead, &common(60000.2))
        .unwrap();
        assert!(!score.veto);
        assert!((score.value - 1.0).abs() < 1e-3);

        let setting = Observation::new("low", 0.0).with_target((lst + 75.0) % 360.0, 0.0);
        let score = Altitude {
            weight: 1.0,
            minimum: Some(Degrees::new(20.0)),
        }
        .score(time, &observer, &setting, &common(60000.2))
        .unwrap();
        assert!(score.veto);
    }

    #[test]
    fn test_altitude_ignores_targetless_observations() {
        let score = Altitude {
            weight: 1.0,
            minimum: None,
        }
        .score(
            ModifiedJulianDate::new(60000.0),
            &site(),
            &Observation::new("flat", 0.0),
            &common(60000.2),
        )
        .unwrap();
        assert_eq!(score, ConstraintScore::score(0.0));
    }

    #[test]
    fn test_time_window() {
        let window = Period::new(
            ModifiedJulianDate::new(60000.1),
            ModifiedJulianDate::new(60000.2),
        )
        .unwrap();
        let obs = Observation::new("transit", 0.0).with_fixed_window(window);
        let c = common(60000.3);

        let before = TimeWindow
            .score(ModifiedJulianDate::new(60000.05), &site(), &obs, &c)
            .unwrap();
        let inside = TimeWindow
            .score(ModifiedJulianDate::new(60000.15), &site(), &obs, &c)
            .unwrap();
        assert!(before.veto);
        assert!(!inside.veto);
    }

    #[test]
    fn test_already_visited() {
        let c = common(60000.3);
        let time = ModifiedJulianDate::new(60000.0);
        assert!(AlreadyVisited
            .score(time, &site(), &Observation::new("done", 0.0), &c)
            .unwrap()
            .veto);
        assert!(!AlreadyVisited
            .score(time, &site(), &Observation::new("fresh", 0.0), &c)
            .unwrap()
            .veto);
    }

    #[test]
    fn test_config_parsing_and_validation() {
        #[derive(Deserialize)]
        struct Wrapper {
            constraints: Vec<ConstraintConfig>,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
[[constraints]]
type = "altitude"
minimum = 25.0

[[constraints]]
type = "duration"
weight = 0.5

[[constraints]]
type = "already_visited"
"#,
        )
        .unwrap();

        assert_eq!(
            parsed.constraints,
            vec![
                ConstraintConfig::Altitude {
                    weight: 1.0,
                    minimum: Some(25.0)
                },
                ConstraintConfig::Duration { weight: 0.5 },
                ConstraintConfig::AlreadyVisited,
            ]
        );
        assert!(parsed.constraints.iter().all(|c| c.validate().is_ok()));
        assert_eq!(parsed.constraints[0].build().name(), "Altitude");

        assert!(ConstraintConfig::Duration { weight: -1.0 }.validate().is_err());
        assert!(ConstraintConfig::Altitude {
            weight: 1.0,
            minimum: Some(120.0)
        }
        .validate()
        .is_err());
    }
}
