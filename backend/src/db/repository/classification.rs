//! Repository trait for the annotation side of the catalog.
//!
//! Targets, subjects and classifications are written by the import glue and
//! only read by the aggregation engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use super::error::RepositoryResult;
use crate::models::{Classification, NewTarget, Subject, SubjectId, Target, TargetId};

/// Repository trait for targets, subjects and classifications.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait ClassificationRepository: Send + Sync {
    /// Check if the store is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if healthy
    /// - `Ok(false)` if unhealthy but no error occurred
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Register a target, or return the existing one with the same survey and identifier.
    async fn store_target(&self, target: &NewTarget) -> RepositoryResult<Target>;

    /// Store a subject unless one with the same platform id exists.
    ///
    /// # Returns
    /// * `Ok(true)` - The subject was inserted
    /// * `Ok(false)` - A subject with this id was already present
    /// * `Err(RepositoryError::ValidationError)` - The subject's target does not exist
    async fn store_subject(&self, subject: &Subject) -> RepositoryResult<bool>;

    /// Store classifications, skipping ids that are already present.
    ///
    /// The store assigns `created` at ingestion; the incoming value is
    /// ignored, so backdated imports still invalidate older reductions.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of classifications newly inserted
    /// * `Err(RepositoryError::ValidationError)` - A classification references an unknown subject
    async fn store_classifications(
        &self,
        classifications: &[Classification],
    ) -> RepositoryResult<usize>;

    /// Retrieve a target by ID.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the target doesn't exist
    async fn get_target(&self, target_id: TargetId) -> RepositoryResult<Target>;

    /// List all targets, ordered by ID.
    async fn list_targets(&self) -> RepositoryResult<Vec<Target>>;

    /// List the subjects of a target, ordered by ID.
    async fn list_subjects(&self, target_id: TargetId) -> RepositoryResult<Vec<Subject>>;

    /// Lazily stream every classification on any subject of the target.
    ///
    /// Order is implementation-defined but stable for unchanged data.
    fn stream_classifications(
        &self,
        target_id: TargetId,
    ) -> BoxStream<'_, RepositoryResult<Classification>>;

    /// Whether any classification of the target was created strictly after `after`.
    async fn has_classifications_created_after(
        &self,
        target_id: TargetId,
        after: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Number of classifications referencing a subject.
    async fn subject_annotation_count(&self, subject_id: SubjectId) -> RepositoryResult<usize>;
}
