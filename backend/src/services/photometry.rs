//! Survey-aware light-curve provider.
//!
//! Reads the raw light curve stored for a target and applies the post-processing
//! its survey requires before grouping strategies see it.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::aggregation::TimeSeriesProvider;
use crate::db::repository::PhotometryRepository;
use crate::models::{FetchMethod, Target, TimeSeries};

/// Hours dropped from the start of every TESS light curve.
pub const DEFAULT_TESS_TRIM_HOURS: f64 = 3.0;

/// [`TimeSeriesProvider`] backed by a [`PhotometryRepository`].
///
/// Targets whose survey has no fetch method never have photometry. Storage
/// failures are logged and reported as missing data.
pub struct SurveyTimeSeriesProvider<R: ?Sized> {
    repo: Arc<R>,
    tess_trim_hours: f64,
}

impl<R: PhotometryRepository + ?Sized> SurveyTimeSeriesProvider<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            tess_trim_hours: DEFAULT_TESS_TRIM_HOURS,
        }
    }

    pub fn with_tess_trim_hours(mut self, hours: f64) -> Self {
        self.tess_trim_hours = hours;
        self
    }

    fn post_process(&self, method: FetchMethod, raw: TimeSeries) -> TimeSeries {
        match method {
            FetchMethod::Tess => raw.trim_leading(self.tess_trim_hours / 24.0),
        }
    }
}

#[async_trait]
impl<R: PhotometryRepository + ?Sized> TimeSeriesProvider for SurveyTimeSeriesProvider<R> {
    async fn fetch(&self, target: &Target) -> Option<Arc<TimeSeries>> {
        let Some(method) = target.fetch_method else {
            debug!(
                "Survey '{}' of target {} has no fetch method",
                target.survey, target.id
            );
            return None;
        };

        match self.repo.get_light_curve(target.id).await {
            Ok(Some(raw)) => {
                let series = self.post_process(method, raw);
                (!series.is_empty()).then(|| Arc::new(series))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load light curve for target {}: {}", target.id, e);
                None
            }
        }
    }
}
