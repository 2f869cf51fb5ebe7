use serde::*;
use std::fmt;
use std::ops::{Add, Sub};

/// Modified Julian Date representation.
/// MJD 0 = 1858-11-17 00:00:00 UTC
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ModifiedJulianDate(qtty::Days);

/// Offset between Julian Date and Modified Julian Date.
pub const MJD_OFFSET: f64 = 2_400_000.5;

/// MJD of the Unix epoch (1970-01-01 00:00:00 UTC).
const UNIX_EPOCH_MJD: f64 = 40587.0;

impl ModifiedJulianDate {
    /// Create a new MJD value.
    pub fn new<V: Into<qtty::Days>>(v: V) -> Self {
        Self(v.into())
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(chrono::Utc::now())
    }

    /// Raw MJD value as f64.
    pub fn value(&self) -> f64 {
        self.0.value()
    }

    /// Julian Date of this instant.
    pub fn julian_date(&self) -> f64 {
        self.value() + MJD_OFFSET
    }

    /// Convert to Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn to_unix_timestamp(&self) -> f64 {
        (self.value() - UNIX_EPOCH_MJD) * 86400.0
    }

    /// Create from Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_timestamp(timestamp: f64) -> Self {
        Self::new(timestamp / 86400.0 + UNIX_EPOCH_MJD)
    }

    /// Convert to chrono DateTime<Utc>.
    pub fn to_datetime(&self) -> chrono::DateTime<chrono::Utc> {
        let secs = self.to_unix_timestamp();
        let secs_i64 = secs.floor() as i64;
        let nanos = ((secs - secs.floor()) * 1e9) as u32;
        chrono::DateTime::from_timestamp(secs_i64, nanos).unwrap_or(chrono::DateTime::UNIX_EPOCH)
    }

    /// Create from chrono DateTime<Utc>.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self::from_unix_timestamp(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9)
    }
}

impl From<f64> for ModifiedJulianDate {
    fn from(v: f64) -> Self {
        ModifiedJulianDate::new(v)
    }
}

impl Add<qtty::Seconds> for ModifiedJulianDate {
    type Output = ModifiedJulianDate;

    fn add(self, rhs: qtty::Seconds) -> Self::Output {
        Self(self.0 + rhs.to::<qtty::Day>())
    }
}

impl Sub<qtty::Seconds> for ModifiedJulianDate {
    type Output = ModifiedJulianDate;

    fn sub(self, rhs: qtty::Seconds) -> Self::Output {
        Self(self.0 - rhs.to::<qtty::Day>())
    }
}

/// Elapsed time between two instants.
impl Sub for ModifiedJulianDate {
    type Output = qtty::Seconds;

    fn sub(self, rhs: Self) -> Self::Output {
        (self.0 - rhs.0).to::<qtty::Second>()
    }
}

impl fmt::Display for ModifiedJulianDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (MJD {:.5})",
            self.to_datetime().format("%Y-%m-%dT%H:%M:%SZ"),
            self.value()
        )
    }
}

/// A closed time interval `[start, stop]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: ModifiedJulianDate,
    pub stop: ModifiedJulianDate,
}

impl Period {
    /// Returns `None` when `stop` precedes `start`.
    pub fn new(start: ModifiedJulianDate, stop: ModifiedJulianDate) -> Option<Self> {
        if stop < start {
            return None;
        }
        Some(Self { start, stop })
    }

    pub fn contains(&self, time: ModifiedJulianDate) -> bool {
        self.start <= time && time <= self.stop
    }

    pub fn duration(&self) -> qtty::Seconds {
        self.stop - self.start
    }
}
