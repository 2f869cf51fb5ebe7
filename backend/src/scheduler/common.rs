use crate::astro::Observer;
use crate::models::ModifiedJulianDate;

/// Values shared by every constraint during one scheduling tick.
///
/// Built once per `get_observation` call so that expensive quantities such as
/// the end of the night are not recomputed for each candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonProperties {
    pub end_of_night: ModifiedJulianDate,
    pub observed_list: Vec<String>,
}

impl CommonProperties {
    pub fn compute(time: ModifiedJulianDate, observer: &Observer, observed_list: &[String]) -> Self {
        Self {
            end_of_night: observer.end_of_night(time),
            observed_list: observed_list.to_vec(),
        }
    }

    pub fn has_observed(&self, name: &str) -> bool {
        self.observed_list.iter().any(|n| n == name)
    }
}
