//! Consensus aggregation for one target.
//!
//! The aggregator streams every classification of a target, asks the
//! grouping strategy where each marked window belongs, and keeps the clusters
//! that reach quorum. It reads the annotation store and the photometry
//! provider, and only ever appends to the reduction store.

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use log::{debug, info};

use super::error::AggregationResult;
use super::provider::TimeSeriesProvider;
use super::statistics::median;
use super::strategy::{GroupingContext, GroupingStrategy};
use crate::db::repository::{ClassificationRepository, ReductionRepository};
use crate::models::{
    Annotation, ClassificationId, JulianDate, ReducedAnnotations, ReducedEvent, Reduction,
    ReductionDraft, Target,
};

/// Smallest cluster that counts as consensus.
pub const MIN_ANNOTATIONS: usize = 5;

/// Annotations sharing one group value.
#[derive(Debug, Clone)]
struct Cluster {
    group: JulianDate,
    x: Vec<f64>,
    x_min: Vec<f64>,
    x_max: Vec<f64>,
}

/// Buckets annotations by exact group value, remembering first-seen order.
#[derive(Debug, Default)]
pub struct ClusterAccumulator {
    clusters: Vec<Cluster>,
    by_key: HashMap<u64, usize>,
}

impl ClusterAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an annotation to the cluster of `group`, opening one if needed.
    pub fn insert(&mut self, group: JulianDate, annotation: &Annotation) {
        let clusters = &mut self.clusters;
        let slot = *self.by_key.entry(group.key_bits()).or_insert_with(|| {
            clusters.push(Cluster {
                group,
                x: Vec::new(),
                x_min: Vec::new(),
                x_max: Vec::new(),
            });
            clusters.len() - 1
        });
        let cluster = &mut self.clusters[slot];
        cluster.x.push(annotation.x);
        cluster.x_min.push(annotation.x_min());
        cluster.x_max.push(annotation.x_max());
    }

    /// Number of distinct groups seen so far.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Summarise every cluster with at least `min_annotations` members.
    pub fn finish(self, min_annotations: usize) -> ReducedAnnotations {
        let mut reduced = ReducedAnnotations::default();
        for cluster in self.clusters {
            let count = cluster.x.len();
            if count < min_annotations {
                continue;
            }
            // Clusters are never empty, so the medians always exist.
            let (Some(x_min), Some(x_max), Some(x_mid)) = (
                median(&cluster.x_min),
                median(&cluster.x_max),
                median(&cluster.x),
            ) else {
                continue;
            };
            reduced.push(ReducedEvent {
                x_min,
                x_mid,
                x_max,
                width: x_max - x_min,
                annotation_count: count,
                group: cluster.group.value(),
            });
        }
        reduced
    }
}

/// Runs a grouping strategy over a target's annotations.
#[derive(Clone)]
pub struct TargetAggregator {
    strategy: Arc<dyn GroupingStrategy>,
    min_annotations: usize,
}

impl std::fmt::Debug for TargetAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetAggregator")
            .field("strategy", &self.strategy.name())
            .field("min_annotations", &self.min_annotations)
            .finish()
    }
}

impl TargetAggregator {
    pub fn new(strategy: Arc<dyn GroupingStrategy>) -> Self {
        Self {
            strategy,
            min_annotations: MIN_ANNOTATIONS,
        }
    }

    pub fn with_min_annotations(mut self, min_annotations: usize) -> Self {
        self.min_annotations = min_annotations;
        self
    }

    pub fn strategy(&self) -> &dyn GroupingStrategy {
        self.strategy.as_ref()
    }

    pub fn min_annotations(&self) -> usize {
        self.min_annotations
    }

    /// Compute the consensus events of a target without storing them.
    ///
    /// # Returns
    /// * `Ok(None)` - The strategy could not load the data it needs
    /// * `Ok(Some(draft))` - A draft, possibly with no events, listing every
    ///   classification considered
    /// * `Err(_)` - A repository failure or a non-recoverable grouping error
    pub async fn aggregate<R>(
        &self,
        repo: &R,
        provider: &dyn TimeSeriesProvider,
        target: &Target,
    ) -> AggregationResult<Option<ReductionDraft>>
    where
        R: ClassificationRepository + ?Sized,
    {
        let Some(context) = self.strategy.prepare(target, provider).await else {
            return Ok(None);
        };

        let mut accumulator = ClusterAccumulator::new();
        let mut classification_ids = Vec::new();
        let mut classifications = repo.stream_classifications(target.id);

        while let Some(classification) = classifications.try_next().await? {
            classification_ids.push(classification.id);
            if let Some(annotation) = classification.annotation() {
                self.place(&context, &annotation, &mut accumulator)?;
            }
        }

        debug!(
            "Target {}: {} classifications, {} candidate groups",
            target.id,
            classification_ids.len(),
            accumulator.cluster_count()
        );

        Ok(Some(ReductionDraft {
            target_id: target.id,
            reduced_annotations: accumulator.finish(self.min_annotations),
            classification_ids,
        }))
    }

    fn place(
        &self,
        context: &GroupingContext,
        annotation: &Annotation,
        accumulator: &mut ClusterAccumulator,
    ) -> AggregationResult<()> {
        let (x_min, x_max) = (annotation.x_min(), annotation.x_max());
        match self
            .strategy
            .group_between(context, x_min.into(), x_max.into())
        {
            Ok(group) => {
                accumulator.insert(group, annotation);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                debug!(
                    "Skipping annotation of classification {}: {}",
                    annotation.classification_id, e
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Aggregate a target and store the result as a new reduction.
    ///
    /// Earlier reductions of the target are left untouched.
    pub async fn persist<R>(
        &self,
        repo: &R,
        provider: &dyn TimeSeriesProvider,
        target: &Target,
    ) -> AggregationResult<Option<Reduction>>
    where
        R: ClassificationRepository + ReductionRepository + ?Sized,
    {
        let Some(draft) = self.aggregate(repo, provider, target).await? else {
            return Ok(None);
        };
        let reduction = repo.create_reduction(&draft).await?;
        info!(
            "Stored reduction {} for target {} ({}): {} events from {} classifications",
            reduction.id,
            target.id,
            target.identifier,
            reduction.reduced_annotations.len(),
            reduction.classification_ids.len()
        );
        Ok(Some(reduction))
    }
}

/// Cluster a fixed set of annotations with a plain grouping function.
///
/// Annotations for which `group_of` returns `None` are skipped.
pub fn reduce_annotations<F>(
    annotations: &[Annotation],
    min_annotations: usize,
    mut group_of: F,
) -> (ReducedAnnotations, Vec<ClassificationId>)
where
    F: FnMut(&Annotation) -> Option<JulianDate>,
{
    let mut accumulator = ClusterAccumulator::new();
    for annotation in annotations {
        if let Some(group) = group_of(annotation) {
            accumulator.insert(group, annotation);
        }
    }
    let ids = annotations.iter().map(|a| a.classification_id).collect();
    (accumulator.finish(min_annotations), ids)
}
