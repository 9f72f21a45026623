//! The pluggable notion of "the same event".
//!
//! A [`GroupingStrategy`] maps an annotation's time window to a canonical
//! Julian Date. Annotations whose windows map to the same date form one
//! cluster. The aggregator only knows this trait; scientific use cases supply
//! their own implementation.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::{GroupingError, GroupingResult};
use super::provider::TimeSeriesProvider;
use crate::models::{JulianDate, Target, TimeSeries};

/// Per-run state handed to every `group_between` call for one target.
///
/// Built once by [`GroupingStrategy::prepare`] at the start of a run and
/// dropped when the run ends, so expensive fetches happen once per target.
#[derive(Debug, Clone)]
pub struct GroupingContext {
    target: Target,
    time_series: Option<Arc<TimeSeries>>,
}

impl GroupingContext {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            time_series: None,
        }
    }

    pub fn with_time_series(mut self, series: Arc<TimeSeries>) -> Self {
        self.time_series = Some(series);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn time_series(&self) -> Option<&TimeSeries> {
        self.time_series.as_deref()
    }
}

/// Decides the canonical anchor time of the event inside a window.
#[async_trait]
pub trait GroupingStrategy: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Load whatever the strategy needs for one target.
    ///
    /// Returning `None` means the required data is unavailable: the run
    /// produces no reduction at all.
    async fn prepare(
        &self,
        target: &Target,
        _provider: &dyn TimeSeriesProvider,
    ) -> Option<GroupingContext> {
        Some(GroupingContext::new(target.clone()))
    }

    /// Canonical time of the event between `x_min` and `x_max`.
    ///
    /// Fails with [`GroupingError::NoGroupFound`] when the window holds no
    /// sensible anchor. The default implementation always fails with
    /// [`GroupingError::NotSupported`].
    fn group_between(
        &self,
        _context: &GroupingContext,
        _x_min: JulianDate,
        _x_max: JulianDate,
    ) -> GroupingResult<JulianDate> {
        Err(GroupingError::NotSupported {
            strategy: self.name().to_string(),
        })
    }
}

/// Strategy without grouping logic.
///
/// Every `group_between` call fails with `NotSupported`; selecting it is a
/// configuration mistake that aborts aggregation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseGrouper;

#[async_trait]
impl GroupingStrategy for BaseGrouper {
    fn name(&self) -> &'static str {
        "base"
    }
}
