//! Aggregation snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{ClassificationId, TargetId};
use crate::define_id_type;

define_id_type!(i64, ReductionId);

/// Consensus events for one target, as index-aligned arrays.
///
/// Entry `i` of every array describes the same cluster. Clusters appear in
/// the order their group was first seen during aggregation, which is not
/// necessarily chronological.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReducedAnnotations {
    pub x_min: Vec<f64>,
    pub x_mid: Vec<f64>,
    pub x_max: Vec<f64>,
    pub width: Vec<f64>,
    /// Number of annotations in each cluster.
    #[serde(rename = "annotations")]
    pub annotation_count: Vec<usize>,
    /// Group key (Julian Date) of each cluster. Absent from snapshots
    /// written before group keys were recorded.
    #[serde(default)]
    pub index: Vec<f64>,
}

/// Statistics for a single surviving cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducedEvent {
    pub x_min: f64,
    pub x_mid: f64,
    pub x_max: f64,
    pub width: f64,
    pub annotation_count: usize,
    pub group: f64,
}

impl ReducedAnnotations {
    pub fn push(&mut self, event: ReducedEvent) {
        self.x_min.push(event.x_min);
        self.x_mid.push(event.x_mid);
        self.x_max.push(event.x_max);
        self.width.push(event.width);
        self.annotation_count.push(event.annotation_count);
        self.index.push(event.group);
    }

    pub fn len(&self) -> usize {
        self.x_mid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_mid.is_empty()
    }

    /// Clusters as records, in array order.
    ///
    /// A snapshot without group keys reports each cluster's median centre
    /// as its group.
    pub fn events(&self) -> Vec<ReducedEvent> {
        (0..self.len())
            .map(|i| ReducedEvent {
                x_min: self.x_min[i],
                x_mid: self.x_mid[i],
                x_max: self.x_max[i],
                width: self.width[i],
                annotation_count: self.annotation_count[i],
                group: self.index.get(i).copied().unwrap_or(self.x_mid[i]),
            })
            .collect()
    }

    /// `(x_min, x_mid, x_max)` triples for shading events on a light-curve plot.
    pub fn highlights(&self) -> Vec<(f64, f64, f64)> {
        self.x_min
            .iter()
            .zip(&self.x_mid)
            .zip(&self.x_max)
            .map(|((&lo, &mid), &hi)| (lo, mid, hi))
            .collect()
    }

    /// True when every array has the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.len();
        self.x_min.len() == n
            && self.x_max.len() == n
            && self.width.len() == n
            && self.annotation_count.len() == n
            && self.index.len() == n
    }
}

/// A persisted aggregation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    pub id: ReductionId,
    pub target_id: TargetId,
    pub reduced_annotations: ReducedAnnotations,
    /// Every classification considered when the snapshot was computed.
    pub classification_ids: Vec<ClassificationId>,
    pub created: DateTime<Utc>,
}

/// An aggregation result that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionDraft {
    pub target_id: TargetId,
    pub reduced_annotations: ReducedAnnotations,
    pub classification_ids: Vec<ClassificationId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(mid: f64, count: usize) -> ReducedEvent {
        ReducedEvent {
            x_min: mid - 0.5,
            x_mid: mid,
            x_max: mid + 0.5,
            width: 1.0,
            annotation_count: count,
            group: mid,
        }
    }

    #[test]
    fn test_push_keeps_arrays_aligned() {
        let mut reduced = ReducedAnnotations::default();
        reduced.push(event(10.0, 5));
        reduced.push(event(3.0, 7));

        assert!(reduced.is_aligned());
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced.x_mid, vec![10.0, 3.0]);
        assert_eq!(reduced.annotation_count, vec![5, 7]);
        assert_eq!(reduced.events()[1], event(3.0, 7));
    }

    #[test]
    fn test_snapshot_without_group_keys() {
        let reduced: ReducedAnnotations = serde_json::from_str(
            r#"{"x_min":[9.5],"x_mid":[10.0],"x_max":[10.5],"width":[1.0],"annotations":[5]}"#,
        )
        .unwrap();

        assert!(reduced.index.is_empty());
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced.events(), vec![event(10.0, 5)]);
    }

    #[test]
    fn test_highlights() {
        let mut reduced = ReducedAnnotations::default();
        reduced.push(event(10.0, 5));
        assert_eq!(reduced.highlights(), vec![(9.5, 10.0, 10.5)]);
    }

    #[test]
    fn test_serialized_keys() {
        let mut reduced = ReducedAnnotations::default();
        reduced.push(event(10.0, 5));
        let value = serde_json::to_value(&reduced).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["x_min", "x_mid", "x_max", "width", "annotations", "index"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(value["annotations"][0], 5);
    }
}
