//! Batch aggregation over every target that lacks a reduction.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{info, warn};
use serde::Serialize;
use tokio::time::Instant;

use super::staleness::{prune_stale_reductions, PruneReport};
use crate::aggregation::{AggregationResult, TargetAggregator, TimeSeriesProvider};
use crate::db::repository::{ClassificationRepository, ReductionRepository};
use crate::models::Target;

/// How a batch is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Targets aggregated at the same time. Zero is treated as one.
    pub concurrency: usize,
    /// No target is started once this much time has elapsed.
    pub deadline: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            deadline: None,
        }
    }
}

/// Counts for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Targets without a reduction when the batch started.
    pub considered: usize,
    pub created: usize,
    /// Targets whose strategy found no data to work on.
    pub skipped_no_data: usize,
    /// Targets that hit a repository error.
    pub failed: usize,
    /// Targets left for a later run because the deadline passed.
    pub not_started: usize,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Created,
    NoData,
    Failed,
    NotStarted,
}

impl BatchReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::NoData => self.skipped_no_data += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::NotStarted => self.not_started += 1,
        }
    }
}

/// Targets without any reduction, each listed once.
async fn unreduced_targets<R>(repo: &R) -> AggregationResult<Vec<Target>>
where
    R: ClassificationRepository + ReductionRepository + ?Sized,
{
    let reduced = repo.reduced_target_ids().await?;
    let mut seen = HashSet::new();
    Ok(repo
        .list_targets()
        .await?
        .into_iter()
        .filter(|t| !reduced.contains(&t.id) && seen.insert(t.id))
        .collect())
}

/// Aggregate and persist every target that has no reduction.
///
/// Per-target repository failures are logged and counted. A non-recoverable
/// grouping error stops the batch and is returned, since it would fail for
/// every remaining target as well.
pub async fn aggregate_unreduced_targets<R>(
    repo: &R,
    aggregator: &TargetAggregator,
    provider: &dyn TimeSeriesProvider,
    options: &BatchOptions,
) -> AggregationResult<BatchReport>
where
    R: ClassificationRepository + ReductionRepository + ?Sized,
{
    let pending = unreduced_targets(repo).await?;
    let started = Instant::now();
    let report = BatchReport {
        considered: pending.len(),
        ..Default::default()
    };

    info!(
        "Aggregating {} unreduced targets with strategy '{}' (concurrency {})",
        pending.len(),
        aggregator.strategy().name(),
        options.concurrency.max(1)
    );

    let report = stream::iter(pending.iter())
        .map(|target| async move {
            if options.deadline.is_some_and(|d| started.elapsed() >= d) {
                return Ok(Outcome::NotStarted);
            }
            match aggregator.persist(repo, provider, target).await {
                Ok(Some(_)) => Ok(Outcome::Created),
                Ok(None) => Ok(Outcome::NoData),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    warn!(
                        "Aggregation failed for target {} ({}): {}",
                        target.id, target.identifier, e
                    );
                    Ok(Outcome::Failed)
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .try_fold(report, |mut report, outcome| async move {
            report.record(outcome);
            Ok(report)
        })
        .await?;

    info!(
        "Batch finished: {} created, {} without data, {} failed, {} not started",
        report.created, report.skipped_no_data, report.failed, report.not_started
    );
    Ok(report)
}

/// Combined result of a maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub prune: PruneReport,
    pub batch: BatchReport,
}

/// Delete stale reductions, then recompute every target left without one.
pub async fn run_maintenance<R>(
    repo: &R,
    aggregator: &TargetAggregator,
    provider: &dyn TimeSeriesProvider,
    options: &BatchOptions,
) -> AggregationResult<MaintenanceReport>
where
    R: ClassificationRepository + ReductionRepository + ?Sized,
{
    let prune = prune_stale_reductions(repo).await?;
    let batch = aggregate_unreduced_targets(repo, aggregator, provider, options).await?;
    Ok(MaintenanceReport { prune, batch })
}
