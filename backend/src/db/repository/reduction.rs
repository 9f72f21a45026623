//! Repository trait for aggregation snapshots.
//!
//! Reductions are append-only: a new snapshot supersedes the previous one,
//! stale snapshots are deleted, nothing is ever updated in place.

use std::collections::HashSet;

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{Reduction, ReductionDraft, ReductionId, TargetId};

/// Repository trait for reductions.
#[async_trait]
pub trait ReductionRepository: Send + Sync {
    /// Persist a draft together with its contributing classification ids.
    ///
    /// The store assigns the id and creation time. The write is atomic: either
    /// the whole reduction is visible afterwards or none of it is.
    async fn create_reduction(&self, draft: &ReductionDraft) -> RepositoryResult<Reduction>;

    /// The most recently created reduction of a target.
    async fn latest_reduction(&self, target_id: TargetId) -> RepositoryResult<Option<Reduction>>;

    /// Every stored reduction, ordered by ID.
    async fn list_reductions(&self) -> RepositoryResult<Vec<Reduction>>;

    /// Delete a reduction.
    ///
    /// # Returns
    /// * `Ok(true)` if it existed
    async fn delete_reduction(&self, reduction_id: ReductionId) -> RepositoryResult<bool>;

    /// Targets that have at least one reduction.
    async fn reduced_target_ids(&self) -> RepositoryResult<HashSet<TargetId>>;
}
