//! Repository trait for downloaded light curves.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{TargetId, TimeSeries};

/// Storage for raw, untrimmed light curves.
///
/// Survey-specific post-processing is applied on read by
/// [`crate::services::photometry::SurveyTimeSeriesProvider`].
#[async_trait]
pub trait PhotometryRepository: Send + Sync {
    /// Replace the light curve of a target.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of samples stored
    async fn store_light_curve(
        &self,
        target_id: TargetId,
        series: &TimeSeries,
    ) -> RepositoryResult<usize>;

    /// The raw light curve of a target, or `None` if none was stored.
    async fn get_light_curve(&self, target_id: TargetId) -> RepositoryResult<Option<TimeSeries>>;
}
