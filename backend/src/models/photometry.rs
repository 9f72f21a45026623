//! Observed light curves.

use serde::{Deserialize, Serialize};

use super::time::JulianDate;

/// A single photometric measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotometrySample {
    pub time: JulianDate,
    pub flux: f64,
    #[serde(default)]
    pub flux_err: f64,
}

impl PhotometrySample {
    pub fn new(time: impl Into<JulianDate>, flux: f64, flux_err: f64) -> Self {
        Self {
            time: time.into(),
            flux,
            flux_err,
        }
    }
}

/// A light curve ordered by ascending time.
///
/// Samples with a non-finite time are discarded on construction. Samples that
/// share a time keep their input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PhotometrySample>", into = "Vec<PhotometrySample>")]
pub struct TimeSeries {
    samples: Vec<PhotometrySample>,
}

impl TimeSeries {
    pub fn new(mut samples: Vec<PhotometrySample>) -> Self {
        samples.retain(|s| s.time.value().is_finite());
        samples.sort_by(|a, b| a.time.value().total_cmp(&b.time.value()));
        Self { samples }
    }

    pub fn samples(&self) -> &[PhotometrySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_time(&self) -> Option<JulianDate> {
        self.samples.first().map(|s| s.time)
    }

    /// Samples with `start <= time <= end`, in time order.
    ///
    /// An inverted range yields an empty slice.
    pub fn slice(&self, start: JulianDate, end: JulianDate) -> &[PhotometrySample] {
        let (start, end) = (start.value(), end.value());
        if !(start <= end) {
            return &[];
        }
        let lo = self.samples.partition_point(|s| s.time.value() < start);
        let hi = self.samples.partition_point(|s| s.time.value() <= end);
        &self.samples[lo..hi.max(lo)]
    }

    /// Drop every sample up to and including `days` after the first one.
    pub fn trim_leading(&self, days: f64) -> TimeSeries {
        let Some(first) = self.first_time() else {
            return TimeSeries::default();
        };
        let cutoff = first.value() + days;
        TimeSeries {
            samples: self
                .samples
                .iter()
                .copied()
                .filter(|s| s.time.value() > cutoff)
                .collect(),
        }
    }
}

impl From<Vec<PhotometrySample>> for TimeSeries {
    fn from(samples: Vec<PhotometrySample>) -> Self {
        TimeSeries::new(samples)
    }
}

impl From<TimeSeries> for Vec<PhotometrySample> {
    fn from(series: TimeSeries) -> Self {
        series.samples
    }
}

/// Index of the brightest finite sample; the earliest one wins ties.
pub fn brightest_index(samples: &[PhotometrySample]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, sample) in samples.iter().enumerate() {
        if !sample.flux.is_finite() {
            continue;
        }
        match best {
            Some((_, flux)) if sample.flux <= flux => {}
            _ => best = Some((i, sample.flux)),
        }
    }
    best.map(|(i, _)| i)
}
