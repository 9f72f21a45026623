//! Service layer for orchestration over the repositories.
//!
//! Services sit between the storage traits and the command-line driver: they
//! run aggregation batches, prune stale reductions and answer read queries.
//! Every function takes the repository explicitly.

pub mod batch;
pub mod photometry;
pub mod reduction;
pub mod staleness;

pub use batch::{
    aggregate_unreduced_targets, run_maintenance, BatchOptions, BatchReport, MaintenanceReport,
};
pub use photometry::{SurveyTimeSeriesProvider, DEFAULT_TESS_TRIM_HOURS};
pub use reduction::{
    highlights, latest_reduced_annotations, subject_annotation_count, target_by_identifier,
};
pub use staleness::{is_stale, prune_stale_reductions, PruneReport};
