//! Merit-based dispatch scheduler.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::CommonProperties;
use super::constraints::{Constraint, ConstraintError, ConstraintScore};
use super::error::{SchedulerError, SchedulerResult};
use super::field_list::FieldListSource;
use crate::astro::Observer;
use crate::models::{ModifiedJulianDate, Observation};

/// Score every candidate starts from before constraints are applied.
const BASE_SCORE: f64 = 1.0;

/// One entry of a ranked schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedObservation {
    pub name: String,
    pub merit: f64,
}

impl RankedObservation {
    pub fn new(name: impl Into<String>, merit: f64) -> Self {
        Self {
            name: name.into(),
            merit,
        }
    }
}

/// Decides whether an observation remains schedulable until a given instant.
pub trait Availability: Send + Sync {
    fn observation_available(
        &self,
        observer: &Observer,
        observation: &Observation,
        until: ModifiedJulianDate,
    ) -> bool;
}

impl<F> Availability for F
where
    F: Fn(&Observer, &Observation, ModifiedJulianDate) -> bool + Send + Sync,
{
    fn observation_available(
        &self,
        observer: &Observer,
        observation: &Observation,
        until: ModifiedJulianDate,
    ) -> bool {
        self(observer, observation, until)
    }
}

/// Target still above the observer horizon at `until`.
///
/// Observations without coordinates (e.g. calibration fields) are always
/// available.
#[derive(Debug, Clone, Copy, Default)]
pub struct HorizonAvailability;

impl Availability for HorizonAvailability {
    fn observation_available(
        &self,
        observer: &Observer,
        observation: &Observation,
        until: ModifiedJulianDate,
    ) -> bool {
        observation
            .target
            .as_ref()
            .map_or(true, |target| observer.target_is_up(target, until, observer.horizon))
    }
}

/// Owns the observation pool and picks the observation to pursue next.
///
/// The scheduler is the only writer of each observation's `merit` and of the
/// current-observation slot; handlers read them through accessors.
pub struct Scheduler {
    observer: Observer,
    observations: BTreeMap<String, Observation>,
    constraints: Vec<Box<dyn Constraint>>,
    current_observation: Option<String>,
    observed_list: Vec<String>,
    availability: Box<dyn Availability>,
    field_list: Option<Box<dyn FieldListSource>>,
}

impl Scheduler {
    pub fn new(observer: Observer, constraints: Vec<Box<dyn Constraint>>) -> Self {
        Self {
            observer,
            observations: BTreeMap::new(),
            constraints,
            current_observation: None,
            observed_list: Vec::new(),
            availability: Box::new(HorizonAvailability),
            field_list: None,
        }
    }

    pub fn with_availability(mut self, availability: impl Availability + 'static) -> Self {
        self.availability = Box::new(availability);
        self
    }

    pub fn with_field_list(mut self, source: impl FieldListSource + 'static) -> Self {
        self.field_list = Some(Box::new(source));
        self
    }

    pub fn has_field_list(&self) -> bool {
        self.field_list.is_some()
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    /// Adds or replaces an observation in the pool.
    pub fn add_observation(&mut self, observation: Observation) -> SchedulerResult<()> {
        observation
            .validate()
            .map_err(|reason| SchedulerError::InvalidObservation {
                name: observation.name.clone(),
                reason,
            })?;
        self.observations
            .insert(observation.name.clone(), observation);
        Ok(())
    }

    pub fn observations(&self) -> &BTreeMap<String, Observation> {
        &self.observations
    }

    pub fn observation(&self, name: &str) -> Option<&Observation> {
        self.observations.get(name)
    }

    pub fn current_observation(&self) -> Option<&Observation> {
        self.current_observation
            .as_deref()
            .and_then(|name| self.observations.get(name))
    }

    /// Sets or clears the current observation.
    pub fn set_current_observation(&mut self, name: Option<&str>) -> SchedulerResult<()> {
        match name {
            Some(name) if !self.observations.contains_key(name) => {
                Err(SchedulerError::UnknownObservation(name.to_string()))
            }
            Some(name) => {
                self.current_observation = Some(name.to_string());
                Ok(())
            }
            None => {
                self.current_observation = None;
                Ok(())
            }
        }
    }

    /// Counts one more exposure against `name` and returns the updated entry.
    pub fn record_exposure(&mut self, name: &str) -> SchedulerResult<&Observation> {
        let observation = self
            .observations
            .get_mut(name)
            .ok_or_else(|| SchedulerError::UnknownObservation(name.to_string()))?;
        observation.current_exposure += 1;
        Ok(&*observation)
    }

    pub fn mark_observed(&mut self, name: &str) {
        if !self.observed_list.iter().any(|n| n == name) {
            self.observed_list.push(name.to_string());
        }
    }

    pub fn observed_list(&self) -> &[String] {
        &self.observed_list
    }

    /// Forgets tonight's visits and exposure progress.
    pub fn reset_observed_list(&mut self) {
        self.observed_list.clear();
        self.current_observation = None;
        for observation in self.observations.values_mut() {
            observation.reset();
        }
    }

    /// Reloads the pool from the configured field list.
    ///
    /// Entries kept by name retain their merit and exposure progress. The
    /// current observation is cleared if the reload dropped it.
    pub fn read_field_list(&mut self) -> SchedulerResult<usize> {
        let source = self.field_list.as_ref().ok_or(SchedulerError::NoFieldList)?;
        let loaded = source.load()?;

        let mut pool = BTreeMap::new();
        for mut observation in loaded {
            if let Some(existing) = self.observations.get(&observation.name) {
                observation.merit = existing.merit;
                observation.current_exposure = existing.current_exposure;
            }
            let name = observation.name.clone();
            if pool.insert(name.clone(), observation).is_some() {
                return Err(SchedulerError::DuplicateObservation(name));
            }
        }
        self.observations = pool;

        if let Some(current) = &self.current_observation {
            if !self.observations.contains_key(current) {
                info!("Current observation {} no longer in field list", current);
                self.current_observation = None;
            }
        }

        info!("Loaded {} observations from field list", self.observations.len());
        Ok(self.observations.len())
    }

    /// Ranks the pool and updates the current observation.
    ///
    /// Returns every surviving candidate ordered by merit when `show_all` is
    /// set, otherwise at most the top entry. An empty result is a valid
    /// outcome meaning nothing can be observed.
    ///
    /// When a current observation exists, still fits in its set duration and
    /// its previously recorded merit is at least the new top merit, it is kept
    /// and placed first with that recorded merit.
    pub fn get_observation(
        &mut self,
        time: Option<ModifiedJulianDate>,
        show_all: bool,
        reread_field_list: bool,
    ) -> SchedulerResult<Vec<RankedObservation>> {
        if reread_field_list {
            debug!("Rereading field list");
            self.read_field_list()?;
        }

        let time = time.unwrap_or_else(ModifiedJulianDate::now);

        let mut valid: BTreeMap<String, f64> = self
            .observations
            .keys()
            .map(|name| (name.clone(), BASE_SCORE))
            .collect();

        let common = CommonProperties::compute(time, &self.observer, &self.observed_list);

        for constraint in &self.constraints {
            info!("Checking constraint: {}", constraint.name());
            for (name, observation) in &self.observations {
                if !valid.contains_key(name) {
                    continue;
                }
                debug!("\tObservation: {}", name);

                let score = checked(
                    &**constraint,
                    name,
                    constraint.score(time, &self.observer, observation, &common)?,
                )?;
                debug!("\t\tScore: {:.05}\tVeto: {}", score.value, score.veto);

                if score.veto {
                    debug!("\t\t{} vetoed by {}", name, constraint.name());
                    valid.remove(name);
                    continue;
                }

                if let Some(merit) = valid.get_mut(name) {
                    *merit += score.value;
                }
            }
        }

        let mut ranked: Vec<RankedObservation> = valid
            .into_iter()
            .map(|(name, score)| {
                let priority = self.observations.get(&name).map_or(0.0, |o| o.priority);
                RankedObservation::new(name, score + priority)
            })
            .collect();
        ranked.sort_by(|a, b| b.merit.total_cmp(&a.merit).then_with(|| a.name.cmp(&b.name)));

        match ranked.first().cloned() {
            Some(top) => {
                if let Some(incumbent) = self.incumbent_to_keep(time, &top) {
                    info!(
                        "Keeping current observation {} (merit {:.3}) over {} (merit {:.3})",
                        incumbent.name, incumbent.merit, top.name, top.merit
                    );
                    ranked.retain(|entry| entry.name != incumbent.name);
                    ranked.insert(0, incumbent);
                } else {
                    self.adopt(&top);
                }
            }
            None => match self.reusable_current(time, &common) {
                Some(current) => {
                    debug!("Reusing {}", current.name);
                    ranked.push(current);
                }
                None => {
                    warn!("No valid observations found");
                    self.current_observation = None;
                }
            },
        }

        if !show_all {
            ranked.truncate(1);
        }

        Ok(ranked)
    }

    /// The current observation, if hysteresis says it should beat `top`.
    fn incumbent_to_keep(
        &self,
        time: ModifiedJulianDate,
        top: &RankedObservation,
    ) -> Option<RankedObservation> {
        let current = self.current_observation()?;
        if current.name == top.name {
            return None;
        }

        let end_of_next_set = time + current.set_duration();
        let available =
            self.availability
                .observation_available(&self.observer, current, end_of_next_set);

        (available && current.merit >= top.merit)
            .then(|| RankedObservation::new(current.name.clone(), current.merit))
    }

    /// The current observation, if it can run one more set before dawn while
    /// nothing else survived the constraints.
    fn reusable_current(
        &self,
        time: ModifiedJulianDate,
        common: &CommonProperties,
    ) -> Option<RankedObservation> {
        let current = self.current_observation()?;
        let end_of_next_set = time + current.set_duration();

        (end_of_next_set < common.end_of_night
            && self
                .availability
                .observation_available(&self.observer, current, end_of_next_set))
        .then(|| RankedObservation::new(current.name.clone(), current.merit))
    }

    fn adopt(&mut self, top: &RankedObservation) {
        if let Some(observation) = self.observations.get_mut(&top.name) {
            observation.merit = top.merit;
            if self.current_observation.as_deref() != Some(top.name.as_str()) {
                info!("New current observation: {} (merit {:.3})", top.name, top.merit);
            }
            self.current_observation = Some(top.name.clone());
        }
    }
}

/// Rejects scores that would poison the merit sum or the ranking order.
fn checked(
    constraint: &dyn Constraint,
    observation: &str,
    score: ConstraintScore,
) -> Result<ConstraintScore, ConstraintError> {
    if score.veto || score.value.is_finite() {
        Ok(score)
    } else {
        Err(ConstraintError::new(
            constraint.name(),
            observation,
            format!("non-finite score {}", score.value),
        ))
    }
}
