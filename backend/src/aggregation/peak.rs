//! Groups annotations by the brightest point inside each marked window.
//!
//! Suitable for stellar flares, pulsations, microlensing events and anything
//! else whose defining feature is a single flux maximum.

use async_trait::async_trait;
use log::info;

use super::error::{GroupingError, GroupingResult};
use super::provider::TimeSeriesProvider;
use super::strategy::{GroupingContext, GroupingStrategy};
use crate::models::{brightest_index, JulianDate, Target, TimeSeries};

/// Peak-locating grouping strategy.
///
/// Two annotations belong together when the maximum-flux sample inside their
/// windows is the same sample of the target's light curve.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakGrouper;

impl PeakGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Time of the brightest sample of `series` within `[x_min, x_max]`.
    ///
    /// Accepts raw Julian Date floats or `chrono::DateTime<Utc>` values.
    pub fn peak_between(
        series: &TimeSeries,
        x_min: impl Into<JulianDate>,
        x_max: impl Into<JulianDate>,
    ) -> GroupingResult<JulianDate> {
        let (x_min, x_max) = (x_min.into(), x_max.into());
        let window = series.slice(x_min, x_max);
        brightest_index(window)
            .map(|i| window[i].time)
            .ok_or(GroupingError::NoGroupFound {
                x_min: x_min.value(),
                x_max: x_max.value(),
            })
    }
}

#[async_trait]
impl GroupingStrategy for PeakGrouper {
    fn name(&self) -> &'static str {
        "peak"
    }

    async fn prepare(
        &self,
        target: &Target,
        provider: &dyn TimeSeriesProvider,
    ) -> Option<GroupingContext> {
        match provider.fetch(target).await {
            Some(series) => Some(GroupingContext::new(target.clone()).with_time_series(series)),
            None => {
                info!(
                    "No photometry for target {} ({}); skipping aggregation",
                    target.id, target.identifier
                );
                None
            }
        }
    }

    fn group_between(
        &self,
        context: &GroupingContext,
        x_min: JulianDate,
        x_max: JulianDate,
    ) -> GroupingResult<JulianDate> {
        match context.time_series() {
            Some(series) => Self::peak_between(series, x_min, x_max),
            None => Err(GroupingError::NoGroupFound {
                x_min: x_min.value(),
                x_max: x_max.value(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhotometrySample, TargetId};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn series(points: &[(f64, f64)]) -> TimeSeries {
        TimeSeries::new(
            points
                .iter()
                .map(|&(t, f)| PhotometrySample::new(t, f, 0.0))
                .collect(),
        )
    }

    fn target() -> Target {
        Target {
            id: TargetId(3),
            identifier: "TIC 3".to_string(),
            survey: "TESS".to_string(),
            fetch_method: None,
            created: Utc::now(),
        }
    }

    struct Fixed(Option<Arc<TimeSeries>>);

    #[async_trait]
    impl TimeSeriesProvider for Fixed {
        async fn fetch(&self, _target: &Target) -> Option<Arc<TimeSeries>> {
            self.0.clone()
        }
    }

    #[test]
    fn test_peak_between_returns_max_flux_time() {
        let ts = series(&[(1.0, 1.0), (2.0, 8.0), (3.0, 4.0), (4.0, 9.0)]);
        assert_eq!(PeakGrouper::peak_between(&ts, 1.0, 3.0).unwrap().value(), 2.0);
        assert_eq!(PeakGrouper::peak_between(&ts, 1.0, 4.0).unwrap().value(), 4.0);
    }

    #[test]
    fn test_peak_between_tie_takes_earliest() {
        let ts = series(&[(1.0, 5.0), (2.0, 7.0), (3.0, 7.0)]);
        assert_eq!(PeakGrouper::peak_between(&ts, 0.0, 5.0).unwrap().value(), 2.0);
    }

    #[test]
    fn test_peak_between_empty_window() {
        let ts = series(&[(1.0, 5.0), (30.0, 7.0)]);
        let err = PeakGrouper::peak_between(&ts, 10.0, 20.0).unwrap_err();
        assert_eq!(
            err,
            GroupingError::NoGroupFound {
                x_min: 10.0,
                x_max: 20.0
            }
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_peak_between_accepts_datetimes() {
        let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 6, 2, 0, 0, 0).unwrap();
        let (a, b) = (JulianDate::from(start).value(), JulianDate::from(end).value());
        let ts = series(&[(a, 1.0), ((a + b) / 2.0, 3.0), (b, 2.0)]);

        let from_datetimes = PeakGrouper::peak_between(&ts, start, end).unwrap();
        let from_floats = PeakGrouper::peak_between(&ts, a, b).unwrap();
        assert_eq!(from_datetimes, from_floats);
        assert_eq!(from_floats.value(), (a + b) / 2.0);
    }

    #[tokio::test]
    async fn test_prepare_without_photometry_yields_none() {
        assert!(PeakGrouper.prepare(&target(), &Fixed(None)).await.is_none());
    }

    #[tokio::test]
    async fn test_prepare_caches_series_in_context() {
        let ts = Arc::new(series(&[(1.0, 1.0), (2.0, 3.0)]));
        let context = PeakGrouper
            .prepare(&target(), &Fixed(Some(ts.clone())))
            .await
            .unwrap();
        assert_eq!(context.time_series().unwrap().len(), 2);
        let group = PeakGrouper
            .group_between(&context, 0.0.into(), 5.0.into())
            .unwrap();
        assert_eq!(group.value(), 2.0);
    }
}
