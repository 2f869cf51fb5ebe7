use qtty::{Degrees, Meters, Seconds};
use serde::{Deserialize, Serialize};
use siderust::astro::ModifiedJulianDate as SiderustMJD;
use siderust::calculus::solar::altitude_periods::find_night_periods;
use siderust::coordinates::centers::ObserverSite;
use siderust::time::Period as SiderustPeriod;

use super::solar::{greenwich_sidereal_degrees, sun_position};
use crate::models::{EquatorialCoordinates, ModifiedJulianDate};

/// How far ahead a night boundary is searched for.
const SEARCH_SPAN_SECONDS: f64 = 2.0 * 86400.0;

/// Observing site and its twilight thresholds.
///
/// Longitude is east-positive. `horizon` is the lowest altitude at which a
/// target is considered observable; `civil_horizon` and `astro_horizon` are the
/// Sun altitudes bounding the flat-field window and astronomical night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub name: String,
    pub latitude: Degrees,
    pub longitude: Degrees,
    pub elevation: Meters,
    pub horizon: Degrees,
    pub civil_horizon: Degrees,
    pub astro_horizon: Degrees,
}

impl Observer {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude: Degrees::new(latitude),
            longitude: Degrees::new(longitude),
            elevation: Meters::new(0.0),
            horizon: Degrees::new(30.0),
            civil_horizon: Degrees::new(-6.0),
            astro_horizon: Degrees::new(-18.0),
        }
    }

    pub fn local_sidereal_degrees(&self, time: ModifiedJulianDate) -> f64 {
        (greenwich_sidereal_degrees(time) + self.longitude.value()).rem_euclid(360.0)
    }

    /// Geometric altitude of `target` at `time` (no refraction).
    pub fn altitude(&self, target: &EquatorialCoordinates, time: ModifiedJulianDate) -> Degrees {
        let hour_angle = (self.local_sidereal_degrees(time) - target.ra.value()).to_radians();
        let lat = self.latitude.value().to_radians();
        let dec = target.dec.value().to_radians();

        let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos();
        Degrees::new(sin_alt.clamp(-1.0, 1.0).asin().to_degrees())
    }

    pub fn sun_altitude(&self, time: ModifiedJulianDate) -> Degrees {
        self.altitude(&sun_position(time), time)
    }

    pub fn target_is_up(
        &self,
        target: &EquatorialCoordinates,
        time: ModifiedJulianDate,
        horizon: Degrees,
    ) -> bool {
        self.altitude(target, time) >= horizon
    }

    /// Sun at or below the astronomical horizon.
    pub fn is_dark(&self, time: ModifiedJulianDate) -> bool {
        self.sun_altitude(time) <= self.astro_horizon
    }

    pub fn site(&self) -> ObserverSite {
        ObserverSite::new(self.longitude, self.latitude, self.elevation)
    }

    /// End of the night that contains `time`, or of the next one when `time`
    /// falls in daylight or twilight.
    ///
    /// Returns `time` itself if no astronomical darkness occurs within the
    /// search span (polar summer) and the end of the span if darkness never
    /// ends within it (polar winter).
    pub fn end_of_night(&self, time: ModifiedJulianDate) -> ModifiedJulianDate {
        let limit = time + Seconds::new(SEARCH_SPAN_SECONDS);
        let search = SiderustPeriod::new(
            SiderustMJD::new(time.value()),
            SiderustMJD::new(limit.value()),
        );

        find_night_periods(self.site(), search, self.astro_horizon)
            .unwrap_or_default()
            .into_iter()
            .map(|night| ModifiedJulianDate::new(night.end.value()))
            .find(|end| *end > time)
            .unwrap_or(time)
    }
}
