use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Julian Date of the Unix epoch (1970-01-01 00:00:00 UTC).
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Julian Date representation.
///
/// This is the canonical comparable timestamp of the pipeline: annotation
/// centres, light-curve sample times and group keys are all Julian Dates.
/// JD 0 = -4712-01-01 12:00:00 (Julian calendar).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct JulianDate(qtty::Days);

impl JulianDate {
    /// Create a new JD value.
    pub fn new(value: f64) -> Self {
        Self(qtty::Days::new(value))
    }

    /// Raw JD value as f64.
    pub fn value(&self) -> f64 {
        self.0.value()
    }

    /// Create from Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_timestamp(timestamp: f64) -> Self {
        Self::new(timestamp / SECONDS_PER_DAY + UNIX_EPOCH_JD)
    }

    /// Create from chrono DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::from_unix_timestamp(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9)
    }

    /// Bit pattern used as an exact-match key.
    ///
    /// `0.0` and `-0.0` compare equal, so both map to the same key.
    pub fn key_bits(&self) -> u64 {
        let value = self.value();
        if value == 0.0 {
            0
        } else {
            value.to_bits()
        }
    }
}

impl From<f64> for JulianDate {
    fn from(v: f64) -> Self {
        JulianDate::new(v)
    }
}

impl From<JulianDate> for f64 {
    fn from(jd: JulianDate) -> Self {
        jd.value()
    }
}

impl From<DateTime<Utc>> for JulianDate {
    fn from(dt: DateTime<Utc>) -> Self {
        JulianDate::from_datetime(dt)
    }
}

impl std::fmt::Display for JulianDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JD {}", self.value())
    }
}
