//! Pruning stale reductions and recomputing them.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use sl_tom_reduction::aggregation::{PeakGrouper, TargetAggregator};
use sl_tom_reduction::db::repository::{ClassificationRepository, ReductionRepository};
use sl_tom_reduction::db::LocalRepository;
use sl_tom_reduction::models::{FetchMethod, Target};
use sl_tom_reduction::services::{
    is_stale, prune_stale_reductions, run_maintenance, BatchOptions, PruneReport,
    SurveyTimeSeriesProvider,
};

use support::{add_marks, light_curve, mark, seed_target, store_curve, subject_of};

async fn flaring_target(repo: &LocalRepository, identifier: &str, first_id: i64) -> Target {
    let target = seed_target(repo, identifier, Some(FetchMethod::Tess)).await;
    store_curve(repo, &target, &light_curve(99.0, 101.0, 0.02, &[(100.0, 5.0)])).await;
    add_marks(
        repo,
        &target,
        first_id,
        &[(99.98, 0.2), (99.99, 0.2), (100.0, 0.2), (100.01, 0.2), (100.02, 0.2)],
    )
    .await;
    target
}

#[tokio::test]
async fn test_late_classification_triggers_recompute() {
    let repo = Arc::new(LocalRepository::new());
    let provider = SurveyTimeSeriesProvider::new(repo.clone());
    let aggregator = TargetAggregator::new(Arc::new(PeakGrouper::new()));
    let target = flaring_target(&repo, "TIC 1", 1).await;

    let first = aggregator
        .persist(repo.as_ref(), &provider, &target)
        .await
        .unwrap()
        .unwrap();
    assert!(!is_stale(repo.as_ref(), &first).await.unwrap());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let late = mark(6, subject_of(target.id), 100.03, 0.2, Utc::now());
    repo.store_classifications(&[late]).await.unwrap();
    assert!(is_stale(repo.as_ref(), &first).await.unwrap());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let report = run_maintenance(
        repo.as_ref(),
        &aggregator,
        &provider,
        &BatchOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.prune, PruneReport { scanned: 1, deleted: 1 });
    assert_eq!(report.batch.created, 1);

    let second = repo.latest_reduction(target.id).await.unwrap().unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.classification_ids.len(), 6);
    assert_eq!(second.reduced_annotations.annotation_count, vec![6]);
    assert!(!is_stale(repo.as_ref(), &second).await.unwrap());

    let again = prune_stale_reductions(repo.as_ref()).await.unwrap();
    assert_eq!(again, PruneReport { scanned: 1, deleted: 0 });
}

#[tokio::test]
async fn test_classifications_of_other_targets_do_not_invalidate() {
    let repo = Arc::new(LocalRepository::new());
    let provider = SurveyTimeSeriesProvider::new(repo.clone());
    let aggregator = TargetAggregator::new(Arc::new(PeakGrouper::new()));
    let reduced = flaring_target(&repo, "TIC 1", 1).await;
    let other = seed_target(&repo, "TIC 2", Some(FetchMethod::Tess)).await;

    let reduction = aggregator
        .persist(repo.as_ref(), &provider, &reduced)
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let late = mark(50, subject_of(other.id), 100.0, 0.2, Utc::now());
    repo.store_classifications(&[late]).await.unwrap();

    let report = prune_stale_reductions(repo.as_ref()).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(repo.reduction_count(), 1);
}

#[tokio::test]
async fn test_prune_removes_every_stale_snapshot_of_a_target() {
    let repo = Arc::new(LocalRepository::new());
    let provider = SurveyTimeSeriesProvider::new(repo.clone());
    let aggregator = TargetAggregator::new(Arc::new(PeakGrouper::new()));
    let target = flaring_target(&repo, "TIC 1", 1).await;

    aggregator
        .persist(repo.as_ref(), &provider, &target)
        .await
        .unwrap();
    let newer = aggregator
        .persist(repo.as_ref(), &provider, &target)
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let late = mark(6, subject_of(target.id), 100.0, 0.2, Utc::now());
    repo.store_classifications(&[late]).await.unwrap();

    let report = prune_stale_reductions(repo.as_ref()).await.unwrap();
    assert_eq!(report, PruneReport { scanned: 2, deleted: 2 });
    assert!(repo.latest_reduction(target.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_backdated_late_import_still_invalidates() {
    let repo = Arc::new(LocalRepository::new());
    let provider = SurveyTimeSeriesProvider::new(repo.clone());
    let aggregator = TargetAggregator::new(Arc::new(PeakGrouper::new()));
    let target = flaring_target(&repo, "TIC 1", 1).await;

    let first = aggregator
        .persist(repo.as_ref(), &provider, &target)
        .await
        .unwrap()
        .unwrap();

    // Marked before the reduction ran, imported after it.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let backdated = first.created - chrono::Duration::hours(1);
    let late = mark(6, subject_of(target.id), 100.03, 0.2, backdated);
    repo.store_classifications(&[late]).await.unwrap();

    let report = prune_stale_reductions(repo.as_ref()).await.unwrap();
    assert_eq!(report, PruneReport { scanned: 1, deleted: 1 });
    assert_eq!(repo.reduction_count(), 0);

    let again = run_maintenance(
        repo.as_ref(),
        &aggregator,
        &provider,
        &BatchOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(again.batch.created, 1);
    let second = repo.latest_reduction(target.id).await.unwrap().unwrap();
    assert_eq!(second.classification_ids.len(), 6);
}
