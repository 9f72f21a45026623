//! Read helpers over the current reduction of a target.

use crate::db::repository::{ClassificationRepository, ReductionRepository, RepositoryResult};
use crate::models::{ReducedAnnotations, SubjectId, Target, TargetId};

/// First target with this identifier, in any survey.
pub async fn target_by_identifier<R>(repo: &R, identifier: &str) -> RepositoryResult<Option<Target>>
where
    R: ClassificationRepository + ?Sized,
{
    Ok(repo
        .list_targets()
        .await?
        .into_iter()
        .find(|t| t.identifier == identifier))
}

/// Consensus arrays of the target's latest reduction.
pub async fn latest_reduced_annotations<R>(
    repo: &R,
    target_id: TargetId,
) -> RepositoryResult<Option<ReducedAnnotations>>
where
    R: ReductionRepository + ?Sized,
{
    Ok(repo
        .latest_reduction(target_id)
        .await?
        .map(|r| r.reduced_annotations))
}

/// `(x_min, x_mid, x_max)` triples for shading the target's events on a plot.
///
/// Empty when the target has no reduction.
pub async fn highlights<R>(repo: &R, target_id: TargetId) -> RepositoryResult<Vec<(f64, f64, f64)>>
where
    R: ReductionRepository + ?Sized,
{
    Ok(latest_reduced_annotations(repo, target_id)
        .await?
        .map(|reduced| reduced.highlights())
        .unwrap_or_default())
}

/// Number of volunteer classifications on a subject.
pub async fn subject_annotation_count<R>(repo: &R, subject_id: SubjectId) -> RepositoryResult<usize>
where
    R: ClassificationRepository + ?Sized,
{
    repo.subject_annotation_count(subject_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::models::{
        NewTarget, ReducedEvent, Reduction, ReductionDraft, ReductionId,
    };
    use chrono::{Duration, Utc};

    async fn target(repo: &LocalRepository) -> TargetId {
        repo.store_target(&NewTarget {
            identifier: "TIC 77".to_string(),
            survey: "TESS".to_string(),
            fetch_method: None,
        })
        .await
        .unwrap()
        .id
    }

    fn reduced(mid: f64) -> ReducedAnnotations {
        let mut reduced = ReducedAnnotations::default();
        reduced.push(ReducedEvent {
            x_min: mid - 1.0,
            x_mid: mid,
            x_max: mid + 1.0,
            width: 2.0,
            annotation_count: 5,
            group: mid,
        });
        reduced
    }

    #[tokio::test]
    async fn test_target_by_identifier() {
        let repo = LocalRepository::new();
        let target_id = target(&repo).await;
        assert_eq!(
            target_by_identifier(&repo, "TIC 77").await.unwrap().map(|t| t.id),
            Some(target_id)
        );
        assert!(target_by_identifier(&repo, "TIC 78").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_reduction_means_no_highlights() {
        let repo = LocalRepository::new();
        let target_id = target(&repo).await;
        assert!(latest_reduced_annotations(&repo, target_id)
            .await
            .unwrap()
            .is_none());
        assert!(highlights(&repo, target_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_highlights_follow_latest_reduction() {
        let repo = LocalRepository::new();
        let target_id = target(&repo).await;
        let now = Utc::now();
        repo.restore_reduction(Reduction {
            id: ReductionId(10),
            target_id,
            reduced_annotations: reduced(20.0),
            classification_ids: vec![],
            created: now - Duration::days(1),
        })
        .unwrap();
        repo.create_reduction(&ReductionDraft {
            target_id,
            reduced_annotations: reduced(30.0),
            classification_ids: vec![],
        })
        .await
        .unwrap();

        assert_eq!(
            highlights(&repo, target_id).await.unwrap(),
            vec![(29.0, 30.0, 31.0)]
        );
    }
}
