use qtty::{Degrees, Seconds};
use serde::{Deserialize, Serialize};

use super::Period;

/// Target position in the ICRS frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoordinates {
    pub ra: Degrees,
    pub dec: Degrees,
}

impl EquatorialCoordinates {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self {
            ra: Degrees::new(ra),
            dec: Degrees::new(dec),
        }
    }
}

/// How an observation is split into exposures.
///
/// The scheduler never inspects the plan beyond the durations derived from it:
/// a *set* is `exposures_per_set` consecutive exposures, and the observation is
/// complete once `min_exposures` frames have been taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposurePlan {
    #[serde(default = "default_exposure_time")]
    pub exposure_time: Seconds,
    #[serde(default = "default_min_exposures")]
    pub min_exposures: u32,
    #[serde(default = "default_exposures_per_set")]
    pub exposures_per_set: u32,
}

fn default_exposure_time() -> Seconds {
    Seconds::new(120.0)
}

fn default_min_exposures() -> u32 {
    60
}

fn default_exposures_per_set() -> u32 {
    10
}

impl Default for ExposurePlan {
    fn default() -> Self {
        Self {
            exposure_time: default_exposure_time(),
            min_exposures: default_min_exposures(),
            exposures_per_set: default_exposures_per_set(),
        }
    }
}

/// A schedulable target loaded from the field list.
///
/// `priority` is static for the session; `merit` holds the score computed on
/// the last scheduling tick that selected this observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub name: String,
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub merit: f64,
    #[serde(default)]
    pub target: Option<EquatorialCoordinates>,
    #[serde(default)]
    pub exposure: ExposurePlan,
    #[serde(default)]
    pub fixed_window: Option<Period>,
    #[serde(default)]
    pub current_exposure: u32,
}

impl Observation {
    pub fn new(name: impl Into<String>, priority: f64) -> Self {
        Self {
            name: name.into(),
            priority,
            merit: 0.0,
            target: None,
            exposure: ExposurePlan::default(),
            fixed_window: None,
            current_exposure: 0,
        }
    }

    pub fn with_target(mut self, ra: f64, dec: f64) -> Self {
        self.target = Some(EquatorialCoordinates::new(ra, dec));
        self
    }

    pub fn with_exposure(mut self, exposure: ExposurePlan) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_fixed_window(mut self, window: Period) -> Self {
        self.fixed_window = Some(window);
        self
    }

    /// Time the target must stay schedulable to complete one exposure set.
    pub fn set_duration(&self) -> Seconds {
        self.exposure.exposure_time * f64::from(self.exposure.exposures_per_set)
    }

    /// Time needed to reach the minimum number of exposures.
    pub fn minimum_duration(&self) -> Seconds {
        self.exposure.exposure_time * f64::from(self.exposure.min_exposures)
    }

    /// True once the exposure counter sits on a set boundary.
    pub fn set_is_finished(&self) -> bool {
        self.current_exposure > 0
            && self.exposure.exposures_per_set > 0
            && self.current_exposure % self.exposure.exposures_per_set == 0
    }

    pub fn is_complete(&self) -> bool {
        self.current_exposure >= self.exposure.min_exposures
    }

    pub fn reset(&mut self) {
        self.merit = 0.0;
        self.current_exposure = 0;
    }

    /// Checks the invariants a field-list entry must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !self.priority.is_finite() {
            return Err(format!("priority must be finite, got {}", self.priority));
        }
        if !(self.exposure.exposure_time.value() > 0.0) {
            return Err(format!(
                "exposure_time must be positive, got {}",
                self.exposure.exposure_time.value()
            ));
        }
        if self.exposure.exposures_per_set == 0 {
            return Err("exposures_per_set must be at least 1".to_string());
        }
        if let Some(target) = &self.target {
            let dec = target.dec.value();
            if !(-90.0..=90.0).contains(&dec) {
                return Err(format!("declination {} outside [-90, 90]", dec));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(exposure_time: f64, min_exposures: u32, exposures_per_set: u32) -> ExposurePlan {
        ExposurePlan {
            exposure_time: Seconds::new(exposure_time),
            min_exposures,
            exposures_per_set,
        }
    }

    #[test]
    fn test_durations_follow_exposure_plan() {
        let obs = Observation::new("M42", 1.0).with_exposure(plan(120.0, 60, 10));
        assert_eq!(obs.set_duration().value(), 1200.0);
        assert_eq!(obs.minimum_duration().value(), 7200.0);
    }

    #[test]
    fn test_set_boundaries() {
        let mut obs = Observation::new("M42", 1.0).with_exposure(plan(60.0, 4, 2));
        assert!(!obs.set_is_finished());
        obs.current_exposure = 1;
        assert!(!obs.set_is_finished());
        obs.current_exposure = 2;
        assert!(obs.set_is_finished());
        assert!(!obs.is_complete());
        obs.current_exposure = 4;
        assert!(obs.is_complete());

        obs.reset();
        assert_eq!(obs.current_exposure, 0);
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        assert!(Observation::new("", 0.0).validate().is_err());
        assert!(Observation::new("X", f64::NAN).validate().is_err());
        assert!(Observation::new("X", 0.0)
            .with_exposure(plan(0.0, 1, 1))
            .validate()
            .is_err());
        assert!(Observation::new("X", 0.0)
            .with_exposure(plan(10.0, 1, 0))
            .validate()
            .is_err());
        assert!(Observation::new("X", 0.0)
            .with_target(10.0, 95.0)
            .validate()
            .is_err());
        assert!(Observation::new("X", 0.0).with_target(10.0, 45.0).validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let obs: Observation = serde_json::from_str(
            r#"{"name": "HD 189733", "priority": 100, "target": {"ra": 300.18, "dec": 22.71}}"#,
        )
        .unwrap();
        assert_eq!(obs.priority, 100.0);
        assert_eq!(obs.merit, 0.0);
        assert_eq!(obs.exposure, ExposurePlan::default());
        assert_eq!(obs.target.unwrap().dec.value(), 22.71);
    }
}
