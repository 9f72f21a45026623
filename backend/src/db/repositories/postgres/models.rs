use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use super::schema::{
    classifications, photometry_samples, subjects, target_reduction_classifications,
    target_reductions, targets,
};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{
    Classification, ClassificationId, FetchMethod, PhotometrySample, ReducedAnnotations,
    Reduction, ReductionId, Subject, SubjectId, Target, TargetId,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = targets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TargetRow {
    pub id: i64,
    pub identifier: String,
    pub survey: String,
    pub fetch_method: Option<String>,
    pub created: DateTime<Utc>,
}

impl TargetRow {
    pub fn into_target(self) -> RepositoryResult<Target> {
        let fetch_method = self
            .fetch_method
            .as_deref()
            .map(str::parse::<FetchMethod>)
            .transpose()
            .map_err(|e| {
                RepositoryError::internal_with_context(
                    e,
                    ErrorContext::new("decode_target")
                        .with_entity("target")
                        .with_entity_id(self.id),
                )
            })?;
        Ok(Target {
            id: TargetId(self.id),
            identifier: self.identifier,
            survey: self.survey,
            fetch_method,
            created: self.created,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = targets)]
pub struct NewTargetRow {
    pub identifier: String,
    pub survey: String,
    pub fetch_method: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = subjects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubjectRow {
    pub id: i64,
    pub target_id: i64,
    pub sequence: String,
    pub data_url: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created: DateTime<Utc>,
}

impl From<&Subject> for SubjectRow {
    fn from(s: &Subject) -> Self {
        Self {
            id: s.id.value(),
            target_id: s.target_id.value(),
            sequence: s.sequence.clone(),
            data_url: s.data_url.clone(),
            start_time: s.start_time,
            end_time: s.end_time,
            metadata: s.metadata.clone(),
            created: s.created,
        }
    }
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Self {
            id: SubjectId(row.id),
            target_id: TargetId(row.target_id),
            sequence: row.sequence,
            data_url: row.data_url,
            start_time: row.start_time,
            end_time: row.end_time,
            metadata: row.metadata,
            created: row.created,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = classifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClassificationRow {
    pub id: i64,
    pub subject_id: i64,
    pub user_id: Option<i64>,
    pub classified_at: DateTime<Utc>,
    pub annotation: Value,
    pub created: DateTime<Utc>,
}

/// Insert form of a classification; `created` is left to the column default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = classifications)]
pub struct NewClassificationRow {
    pub id: i64,
    pub subject_id: i64,
    pub user_id: Option<i64>,
    pub classified_at: DateTime<Utc>,
    pub annotation: Value,
}

impl From<&Classification> for NewClassificationRow {
    fn from(c: &Classification) -> Self {
        Self {
            id: c.id.value(),
            subject_id: c.subject_id.value(),
            user_id: c.user_id,
            classified_at: c.timestamp,
            annotation: c.annotation.clone(),
        }
    }
}

impl From<ClassificationRow> for Classification {
    fn from(row: ClassificationRow) -> Self {
        Self {
            id: ClassificationId(row.id),
            subject_id: SubjectId(row.subject_id),
            user_id: row.user_id,
            timestamp: row.classified_at,
            annotation: row.annotation,
            created: row.created,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = target_reductions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReductionRow {
    pub id: i64,
    pub target_id: i64,
    pub reduced_annotations: Value,
    pub created: DateTime<Utc>,
}

impl ReductionRow {
    pub fn into_reduction(self, classification_ids: Vec<i64>) -> RepositoryResult<Reduction> {
        let reduced_annotations: ReducedAnnotations =
            serde_json::from_value(self.reduced_annotations).map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Failed to parse reduced annotations: {}", e),
                    ErrorContext::new("decode_reduction")
                        .with_entity("reduction")
                        .with_entity_id(self.id),
                )
            })?;
        Ok(Reduction {
            id: ReductionId(self.id),
            target_id: TargetId(self.target_id),
            reduced_annotations,
            classification_ids: classification_ids.into_iter().map(ClassificationId).collect(),
            created: self.created,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = target_reductions)]
pub struct NewReductionRow {
    pub target_id: i64,
    pub reduced_annotations: Value,
}

#[derive(Debug, Clone, Copy, Queryable, Selectable, Insertable)]
#[diesel(table_name = target_reduction_classifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReductionClassificationRow {
    pub reduction_id: i64,
    pub classification_id: i64,
}

#[derive(Debug, Clone, Copy, Queryable, Selectable, Insertable)]
#[diesel(table_name = photometry_samples)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PhotometrySampleRow {
    pub target_id: i64,
    pub sample_index: i32,
    pub time_jd: f64,
    pub flux: f64,
    pub flux_err: f64,
}

impl From<PhotometrySampleRow> for PhotometrySample {
    fn from(row: PhotometrySampleRow) -> Self {
        PhotometrySample::new(row.time_jd, row.flux, row.flux_err)
    }
}
