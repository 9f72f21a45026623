//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing, local development and the file-backed
//! command-line driver. All data is kept in ordered maps, so iteration order
//! is deterministic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::db::repository::*;
use crate::models::*;

/// In-memory local repository.
///
/// # Example
/// ```
/// use sl_tom_reduction::db::repositories::LocalRepository;
/// use sl_tom_reduction::db::ClassificationRepository;
/// use sl_tom_reduction::models::NewTarget;
///
/// # tokio_test_block(async {
/// let repo = LocalRepository::new();
/// let target = repo
///     .store_target(&NewTarget {
///         identifier: "TIC 1".to_string(),
///         survey: "TESS".to_string(),
///         fetch_method: None,
///     })
///     .await
///     .unwrap();
/// assert_eq!(repo.list_targets().await.unwrap(), vec![target]);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    targets: BTreeMap<TargetId, Target>,
    subjects: BTreeMap<SubjectId, Subject>,
    classifications: BTreeMap<ClassificationId, Classification>,
    reductions: BTreeMap<ReductionId, Reduction>,
    light_curves: HashMap<TargetId, TimeSeries>,

    // ID counters
    next_target_id: i64,
    next_reduction_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            subjects: BTreeMap::new(),
            classifications: BTreeMap::new(),
            reductions: BTreeMap::new(),
            light_curves: HashMap::new(),
            next_target_id: 1,
            next_reduction_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn subject_ids_for(&self, target_id: TargetId) -> HashSet<SubjectId> {
        self.subjects
            .values()
            .filter(|s| s.target_id == target_id)
            .map(|s| s.id)
            .collect()
    }

    /// Insert unseen classifications, all or nothing.
    ///
    /// With `ingested` set, every inserted row takes that time as `created`;
    /// otherwise the incoming value is kept.
    fn insert_classifications(
        &mut self,
        classifications: &[Classification],
        operation: &str,
        ingested: Option<DateTime<Utc>>,
    ) -> RepositoryResult<usize> {
        // Validate everything first so a bad batch leaves no partial import.
        if let Some(orphan) = classifications
            .iter()
            .find(|c| !self.subjects.contains_key(&c.subject_id))
        {
            return Err(RepositoryError::validation_with_context(
                format!("Subject {} not found", orphan.subject_id),
                ErrorContext::new(operation)
                    .with_entity("classification")
                    .with_entity_id(orphan.id),
            ));
        }

        let mut inserted = 0;
        for classification in classifications {
            if self.classifications.contains_key(&classification.id) {
                continue;
            }
            let mut stored = classification.clone();
            if let Some(created) = ingested {
                stored.created = created;
            }
            self.classifications.insert(stored.id, stored);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn classifications_for(&self, target_id: TargetId) -> Vec<Classification> {
        let subjects = self.subject_ids_for(target_id);
        self.classifications
            .values()
            .filter(|c| subjects.contains(&c.subject_id))
            .cloned()
            .collect()
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Re-insert a previously exported target, keeping its id and creation time.
    pub fn restore_target(&self, target: Target) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        let clash = data.targets.values().any(|t| {
            t.id != target.id && t.survey == target.survey && t.identifier == target.identifier
        });
        if clash {
            return Err(RepositoryError::validation_with_context(
                format!("Duplicate target {} in survey {}", target.identifier, target.survey),
                ErrorContext::new("restore_target")
                    .with_entity("target")
                    .with_entity_id(target.id),
            ));
        }
        data.next_target_id = data.next_target_id.max(target.id.value() + 1);
        data.targets.insert(target.id, target);
        Ok(())
    }

    /// Re-insert previously exported classifications, keeping their
    /// ingestion times so restored reductions are judged against the
    /// original history.
    pub fn restore_classifications(
        &self,
        classifications: &[Classification],
    ) -> RepositoryResult<usize> {
        self.check_health()?;
        let mut data = self.data.write();
        data.insert_classifications(classifications, "restore_classifications", None)
    }

    /// Re-insert a previously exported reduction, keeping its id and creation time.
    pub fn restore_reduction(&self, reduction: Reduction) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        if !data.targets.contains_key(&reduction.target_id) {
            return Err(RepositoryError::validation_with_context(
                format!("Target {} not found", reduction.target_id),
                ErrorContext::new("restore_reduction")
                    .with_entity("reduction")
                    .with_entity_id(reduction.id),
            ));
        }
        data.next_reduction_id = data.next_reduction_id.max(reduction.id.value() + 1);
        data.reductions.insert(reduction.id, reduction);
        Ok(())
    }

    pub fn target_count(&self) -> usize {
        self.data.read().targets.len()
    }

    pub fn reduction_count(&self) -> usize {
        self.data.read().reductions.len()
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection("Repository is not healthy"));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassificationRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn store_target(&self, target: &NewTarget) -> RepositoryResult<Target> {
        self.check_health()?;
        let mut data = self.data.write();

        if let Some(existing) = data
            .targets
            .values()
            .find(|t| t.survey == target.survey && t.identifier == target.identifier)
        {
            return Ok(existing.clone());
        }

        let id = TargetId(data.next_target_id);
        data.next_target_id += 1;
        let stored = Target {
            id,
            identifier: target.identifier.clone(),
            survey: target.survey.clone(),
            fetch_method: target.fetch_method,
            created: Utc::now(),
        };
        data.targets.insert(id, stored.clone());
        Ok(stored)
    }

    async fn store_subject(&self, subject: &Subject) -> RepositoryResult<bool> {
        self.check_health()?;
        let mut data = self.data.write();

        if !data.targets.contains_key(&subject.target_id) {
            return Err(RepositoryError::validation_with_context(
                format!("Target {} not found", subject.target_id),
                ErrorContext::new("store_subject")
                    .with_entity("subject")
                    .with_entity_id(subject.id),
            ));
        }
        if data.subjects.contains_key(&subject.id) {
            return Ok(false);
        }
        data.subjects.insert(subject.id, subject.clone());
        Ok(true)
    }

    async fn store_classifications(
        &self,
        classifications: &[Classification],
    ) -> RepositoryResult<usize> {
        self.check_health()?;
        let mut data = self.data.write();
        data.insert_classifications(classifications, "store_classifications", Some(Utc::now()))
    }

    async fn get_target(&self, target_id: TargetId) -> RepositoryResult<Target> {
        self.data
            .read()
            .targets
            .get(&target_id)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Target {} not found", target_id),
                    ErrorContext::new("get_target")
                        .with_entity("target")
                        .with_entity_id(target_id),
                )
            })
    }

    async fn list_targets(&self) -> RepositoryResult<Vec<Target>> {
        self.check_health()?;
        Ok(self.data.read().targets.values().cloned().collect())
    }

    async fn list_subjects(&self, target_id: TargetId) -> RepositoryResult<Vec<Subject>> {
        Ok(self
            .data
            .read()
            .subjects
            .values()
            .filter(|s| s.target_id == target_id)
            .cloned()
            .collect())
    }

    fn stream_classifications(
        &self,
        target_id: TargetId,
    ) -> BoxStream<'_, RepositoryResult<Classification>> {
        if let Err(e) = self.check_health() {
            return stream::once(async move { Err(e) }).boxed();
        }
        let classifications = self.data.read().classifications_for(target_id);
        stream::iter(classifications.into_iter().map(Ok)).boxed()
    }

    async fn has_classifications_created_after(
        &self,
        target_id: TargetId,
        after: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.check_health()?;
        let data = self.data.read();
        let subjects = data.subject_ids_for(target_id);
        Ok(data
            .classifications
            .values()
            .any(|c| subjects.contains(&c.subject_id) && c.created > after))
    }

    async fn subject_annotation_count(&self, subject_id: SubjectId) -> RepositoryResult<usize> {
        Ok(self
            .data
            .read()
            .classifications
            .values()
            .filter(|c| c.subject_id == subject_id)
            .count())
    }
}

#[async_trait]
impl ReductionRepository for LocalRepository {
    async fn create_reduction(&self, draft: &ReductionDraft) -> RepositoryResult<Reduction> {
        self.check_health()?;
        let mut data = self.data.write();

        if !data.targets.contains_key(&draft.target_id) {
            return Err(RepositoryError::validation_with_context(
                format!("Target {} not found", draft.target_id),
                ErrorContext::new("create_reduction")
                    .with_entity("target")
                    .with_entity_id(draft.target_id),
            ));
        }

        let id = ReductionId(data.next_reduction_id);
        data.next_reduction_id += 1;
        let reduction = Reduction {
            id,
            target_id: draft.target_id,
            reduced_annotations: draft.reduced_annotations.clone(),
            classification_ids: draft.classification_ids.clone(),
            created: Utc::now(),
        };
        data.reductions.insert(id, reduction.clone());
        Ok(reduction)
    }

    async fn latest_reduction(&self, target_id: TargetId) -> RepositoryResult<Option<Reduction>> {
        Ok(self
            .data
            .read()
            .reductions
            .values()
            .filter(|r| r.target_id == target_id)
            .max_by_key(|r| (r.created, r.id))
            .cloned())
    }

    async fn list_reductions(&self) -> RepositoryResult<Vec<Reduction>> {
        self.check_health()?;
        Ok(self.data.read().reductions.values().cloned().collect())
    }

    async fn delete_reduction(&self, reduction_id: ReductionId) -> RepositoryResult<bool> {
        self.check_health()?;
        Ok(self.data.write().reductions.remove(&reduction_id).is_some())
    }

    async fn reduced_target_ids(&self) -> RepositoryResult<HashSet<TargetId>> {
        self.check_health()?;
        Ok(self
            .data
            .read()
            .reductions
            .values()
            .map(|r| r.target_id)
            .collect())
    }
}

#[async_trait]
impl PhotometryRepository for LocalRepository {
    async fn store_light_curve(
        &self,
        target_id: TargetId,
        series: &TimeSeries,
    ) -> RepositoryResult<usize> {
        self.check_health()?;
        let mut data = self.data.write();
        if !data.targets.contains_key(&target_id) {
            return Err(RepositoryError::validation_with_context(
                format!("Target {} not found", target_id),
                ErrorContext::new("store_light_curve")
                    .with_entity("target")
                    .with_entity_id(target_id),
            ));
        }
        data.light_curves.insert(target_id, series.clone());
        Ok(series.len())
    }

    async fn get_light_curve(&self, target_id: TargetId) -> RepositoryResult<Option<TimeSeries>> {
        self.check_health()?;
        Ok(self.data.read().light_curves.get(&target_id).cloned())
    }
}
