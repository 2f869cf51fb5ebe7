use crate::models::{EquatorialCoordinates, ModifiedJulianDate};

/// Julian Date of the J2000.0 epoch.
const J2000: f64 = 2_451_545.0;

fn days_since_j2000(time: ModifiedJulianDate) -> f64 {
    time.julian_date() - J2000
}

/// Apparent equatorial position of the Sun.
pub fn sun_position(time: ModifiedJulianDate) -> EquatorialCoordinates {
    let n = days_since_j2000(time);
    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();

    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

    let ra = (obliquity.cos() * ecliptic_longitude.sin())
        .atan2(ecliptic_longitude.cos())
        .to_degrees()
        .rem_euclid(360.0);
    let dec = (obliquity.sin() * ecliptic_longitude.sin())
        .asin()
        .to_degrees();

    EquatorialCoordinates::new(ra, dec)
}

/// Greenwich mean sidereal time, in degrees.
pub fn greenwich_sidereal_degrees(time: ModifiedJulianDate) -> f64 {
    (280.460_618_37 + 360.985_647_366_29 * days_since_j2000(time)).rem_euclid(360.0)
}
