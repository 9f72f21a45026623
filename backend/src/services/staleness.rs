//! Invalidation of outdated reductions.
//!
//! A reduction is stale once a classification of its target has been created
//! after it. Stale reductions are deleted, never repaired; the batch driver
//! recomputes the target on its next pass.

use log::{debug, info};
use serde::Serialize;

use crate::db::repository::{ClassificationRepository, ReductionRepository, RepositoryResult};
use crate::models::Reduction;

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub scanned: usize,
    pub deleted: usize,
}

/// Whether newer classifications exist for the reduction's target.
pub async fn is_stale<R>(repo: &R, reduction: &Reduction) -> RepositoryResult<bool>
where
    R: ClassificationRepository + ?Sized,
{
    repo.has_classifications_created_after(reduction.target_id, reduction.created)
        .await
}

/// Delete every stale reduction.
pub async fn prune_stale_reductions<R>(repo: &R) -> RepositoryResult<PruneReport>
where
    R: ClassificationRepository + ReductionRepository + ?Sized,
{
    let reductions = repo.list_reductions().await?;
    let mut report = PruneReport {
        scanned: reductions.len(),
        deleted: 0,
    };

    for reduction in &reductions {
        if !is_stale(repo, reduction).await? {
            continue;
        }
        if repo.delete_reduction(reduction.id).await? {
            debug!(
                "Deleted stale reduction {} of target {}",
                reduction.id, reduction.target_id
            );
            report.deleted += 1;
        }
    }

    info!(
        "Pruned {} of {} reductions",
        report.deleted, report.scanned
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::models::{
        Classification, ClassificationId, NewTarget, ReducedAnnotations, ReductionId, Subject,
        SubjectId,
    };
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    async fn setup(classified_at: DateTime<Utc>) -> (LocalRepository, crate::models::TargetId) {
        let repo = LocalRepository::new();
        let target = repo
            .store_target(&NewTarget {
                identifier: "TIC 5".to_string(),
                survey: "TESS".to_string(),
                fetch_method: None,
            })
            .await
            .unwrap();
        repo.store_subject(&Subject {
            id: SubjectId(50),
            target_id: target.id,
            sequence: "3".to_string(),
            data_url: None,
            start_time: None,
            end_time: None,
            metadata: json!({}),
            created: classified_at,
        })
        .await
        .unwrap();
        repo.restore_classifications(&[mark(500, classified_at)])
            .unwrap();
        (repo, target.id)
    }

    fn mark(id: i64, classified_at: DateTime<Utc>) -> Classification {
        Classification {
            id: ClassificationId(id),
            subject_id: SubjectId(50),
            user_id: None,
            timestamp: classified_at,
            annotation: json!([]),
            created: classified_at,
        }
    }

    fn reduction(id: i64, target_id: crate::models::TargetId, created: DateTime<Utc>) -> Reduction {
        Reduction {
            id: ReductionId(id),
            target_id,
            reduced_annotations: ReducedAnnotations::default(),
            classification_ids: vec![ClassificationId(500)],
            created,
        }
    }

    #[tokio::test]
    async fn test_stale_when_classification_is_newer() {
        let now = Utc::now();
        let (repo, target_id) = setup(now).await;

        let older = reduction(1, target_id, now - Duration::hours(1));
        let same = reduction(2, target_id, now);
        let newer = reduction(3, target_id, now + Duration::hours(1));

        assert!(is_stale(&repo, &older).await.unwrap());
        assert!(!is_stale(&repo, &same).await.unwrap());
        assert!(!is_stale(&repo, &newer).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_deletes_only_stale() {
        let now = Utc::now();
        let (repo, target_id) = setup(now).await;
        repo.restore_reduction(reduction(1, target_id, now - Duration::minutes(5)))
            .unwrap();
        repo.restore_reduction(reduction(2, target_id, now + Duration::minutes(5)))
            .unwrap();

        let report = prune_stale_reductions(&repo).await.unwrap();
        assert_eq!(
            report,
            PruneReport {
                scanned: 2,
                deleted: 1
            }
        );

        let remaining = repo.list_reductions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ReductionId(2));
    }

    #[tokio::test]
    async fn test_backdated_import_still_invalidates() {
        let classified_at = Utc::now() - Duration::hours(2);
        let (repo, target_id) = setup(classified_at).await;
        let reduction = repo
            .create_reduction(&crate::models::ReductionDraft {
                target_id,
                reduced_annotations: ReducedAnnotations::default(),
                classification_ids: vec![ClassificationId(500)],
            })
            .await
            .unwrap();

        // Volunteer time predates the reduction; ingestion does not.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.store_classifications(&[mark(501, reduction.created - Duration::hours(1))])
            .await
            .unwrap();

        assert!(is_stale(&repo, &reduction).await.unwrap());
        assert_eq!(
            prune_stale_reductions(&repo).await.unwrap(),
            PruneReport {
                scanned: 1,
                deleted: 1
            }
        );
        assert!(repo.latest_reduction(target_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_on_empty_store() {
        let repo = LocalRepository::new();
        assert_eq!(
            prune_stale_reductions(&repo).await.unwrap(),
            PruneReport::default()
        );
    }
}
