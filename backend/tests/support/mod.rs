#![allow(dead_code)]

use obsctl::astro::Observer;
use obsctl::hardware::{SimulatedCamera, SimulatedObservatory};
use obsctl::models::{ModifiedJulianDate, Observation};
use obsctl::scheduler::{
    CommonProperties, Constraint, ConstraintConfig, ConstraintError, ConstraintScore, Scheduler,
};
use std::collections::HashMap;

/// 2023-02-25 00:00 UTC; astronomical night at the equator lasts until ~05:00.
pub const MIDNIGHT: f64 = 60000.0;

pub fn midnight() -> ModifiedJulianDate {
    ModifiedJulianDate::new(MIDNIGHT)
}

pub fn equator() -> Observer {
    Observer::new("equator", 0.0, 0.0)
}

/// Constraint returning fixed scores by observation name, zero otherwise.
pub struct ScoreTable {
    label: String,
    scores: HashMap<String, ConstraintScore>,
}

impl ScoreTable {
    pub fn boxed(label: &str, entries: &[(&str, ConstraintScore)]) -> Box<dyn Constraint> {
        Box::new(Self {
            label: label.to_string(),
            scores: entries
                .iter()
                .map(|(name, score)| (name.to_string(), *score))
                .collect(),
        })
    }
}

impl Constraint for ScoreTable {
    fn name(&self) -> &str {
        &self.label
    }

    fn score(
        &self,
        _time: ModifiedJulianDate,
        _observer: &Observer,
        observation: &Observation,
        _common: &CommonProperties,
    ) -> Result<ConstraintScore, ConstraintError> {
        Ok(self
            .scores
            .get(&observation.name)
            .copied()
            .unwrap_or(ConstraintScore::score(0.0)))
    }
}

pub fn default_constraints() -> Vec<Box<dyn Constraint>> {
    ConstraintConfig::defaults()
        .iter()
        .map(ConstraintConfig::build)
        .collect()
}

/// Targets spread in hour angle around the meridian at midnight.
///
/// `offsets` are in degrees of right ascension from the local sidereal time;
/// positive offsets rise later.
pub fn sky_pool(offsets: &[(&str, f64, f64)]) -> Vec<Observation> {
    let lst = equator().local_sidereal_degrees(midnight());
    offsets
        .iter()
        .map(|(name, offset, priority)| {
            Observation::new(*name, *priority).with_target((lst + offset).rem_euclid(360.0), 0.0)
        })
        .collect()
}

pub fn scheduler_with(pool: Vec<Observation>) -> Scheduler {
    let mut scheduler = Scheduler::new(equator(), default_constraints());
    for observation in pool {
        scheduler.add_observation(observation).unwrap();
    }
    scheduler
}

pub fn simulated_site() -> SimulatedObservatory {
    SimulatedObservatory::new(equator(), Box::new(SimulatedCamera::new("sim")))
        .with_clock(midnight())
}
