//! # SL-TOM Reduction Backend
//!
//! Turns crowd-sourced time-range annotations on astronomical light curves
//! into consensus event catalogues.
//!
//! Volunteers mark suspected events (flares, transits, microlensing bumps) on
//! light-curve charts. For every target, the aggregation engine maps each mark
//! to a canonical time through a pluggable [`aggregation::GroupingStrategy`],
//! clusters marks that share a canonical time, drops clusters below quorum and
//! stores the medians of the survivors as a [`models::Reduction`].
//!
//! ## Architecture
//!
//! - [`models`]: Targets, subjects, classifications, light curves and reductions
//! - [`aggregation`]: Grouping strategies and the per-target aggregator
//! - [`db`]: Repository traits with in-memory and Postgres implementations
//! - [`services`]: Batch aggregation, staleness pruning and read helpers
//! - [`config`]: TOML configuration with environment overrides
//! - [`io`]: JSON dataset files used by the command-line driver
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use sl_tom_reduction::aggregation::{PeakGrouper, TargetAggregator};
//! use sl_tom_reduction::db::LocalRepository;
//! use sl_tom_reduction::services::{aggregate_unreduced_targets, BatchOptions, SurveyTimeSeriesProvider};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let repo = Arc::new(LocalRepository::new());
//! let provider = SurveyTimeSeriesProvider::new(repo.clone());
//! let aggregator = TargetAggregator::new(Arc::new(PeakGrouper::new()));
//!
//! let report = aggregate_unreduced_targets(repo.as_ref(), &aggregator, &provider, &BatchOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(report.considered, 0);
//! # });
//! ```

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod aggregation;
pub mod config;
pub mod db;
pub mod io;
pub mod models;
pub mod services;
