use qtty::Degrees;

use super::camera::ExposureRecord;
use super::error::HardwareResult;
use crate::astro::Observer;
use crate::models::{ModifiedJulianDate, Observation};
use crate::scheduler::{Availability, HorizonAvailability};

/// The observatory as seen by the state handlers.
///
/// Query methods have defaults derived from [`Observer`]; actions return
/// [`HardwareResult`] and are expected to fail loudly rather than leave the
/// hardware in an unknown state.
pub trait Observatory: Send {
    fn observer(&self) -> &Observer;

    /// Whether calibration frames should be taken at twilight.
    fn take_flat_fields(&self) -> bool;

    fn now(&self) -> ModifiedJulianDate {
        ModifiedJulianDate::now()
    }

    fn sun_altitude(&self, time: ModifiedJulianDate) -> Degrees {
        self.observer().sun_altitude(time)
    }

    fn is_weather_safe(&self) -> bool {
        true
    }

    /// True while `observation` remains observable up to `until`.
    fn observation_still_available(
        &self,
        observation: &Observation,
        until: ModifiedJulianDate,
    ) -> bool {
        HorizonAvailability.observation_available(self.observer(), observation, until)
    }

    /// Brings the mount and camera online.
    fn initialize(&mut self) -> HardwareResult<()>;

    fn perform_calibration_sequence(&mut self) -> HardwareResult<()>;

    fn slew_to(&mut self, observation: &Observation) -> HardwareResult<()>;

    fn take_pointing_image(&mut self, observation: &Observation) -> HardwareResult<ExposureRecord>;

    /// Takes one science exposure of `observation`.
    fn observe(&mut self, observation: &Observation) -> HardwareResult<ExposureRecord>;

    fn park(&mut self) -> HardwareResult<()>;

    /// End-of-night housekeeping on the frames taken tonight.
    fn cleanup_observations(&mut self) -> HardwareResult<()>;
}
