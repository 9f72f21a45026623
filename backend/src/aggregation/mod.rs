//! Consensus aggregation engine.
//!
//! # Module Organization
//!
//! - [`strategy`]: The [`GroupingStrategy`] trait and the base variant
//! - [`peak`]: Grouping by the brightest sample inside a window
//! - [`aggregator`]: Clustering, quorum and medians for one target
//! - [`provider`]: Light-curve access during a run
//! - [`statistics`]: Median estimator
//! - [`error`]: Grouping and aggregation errors

pub mod aggregator;
pub mod error;
pub mod peak;
pub mod provider;
pub mod statistics;
pub mod strategy;

pub use aggregator::{reduce_annotations, ClusterAccumulator, TargetAggregator, MIN_ANNOTATIONS};
pub use error::{AggregationError, AggregationResult, GroupingError, GroupingResult};
pub use peak::PeakGrouper;
pub use provider::{NoPhotometry, TimeSeriesProvider};
pub use statistics::median;
pub use strategy::{BaseGrouper, GroupingContext, GroupingStrategy};
