//! Access to observed light curves during an aggregation run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Target, TimeSeries};

/// Supplies a target's light curve.
///
/// Fetch failures of any kind are reported as `None`; providers log the cause
/// themselves and never raise into the aggregator.
#[async_trait]
pub trait TimeSeriesProvider: Send + Sync {
    async fn fetch(&self, target: &Target) -> Option<Arc<TimeSeries>>;
}

/// A provider with nothing to offer, for strategies that need no photometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPhotometry;

#[async_trait]
impl TimeSeriesProvider for NoPhotometry {
    async fn fetch(&self, _target: &Target) -> Option<Arc<TimeSeries>> {
        None
    }
}
