//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Automatic migration execution
//! - Paged streaming of classifications
//!
//! Classification ingestion times come from the database clock
//! (`created DEFAULT NOW()`), never from the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::task;

pub use crate::db::config::PostgresConfig;
use crate::db::repository::{
    ClassificationRepository, ErrorContext, PhotometryRepository, ReductionRepository,
    RepositoryError, RepositoryResult,
};
use crate::models::{
    Classification, NewTarget, Reduction, ReductionDraft, ReductionId, Subject,
    SubjectId, Target, TargetId, TimeSeries,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Rows fetched per round trip when streaming classifications.
const STREAM_PAGE_SIZE: i64 = 1000;

/// Rows per multi-row INSERT, well under the Postgres bind parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// Blocks while the pool connects; call from a blocking context.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self { pool, config })
    }

    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient failures.
    ///
    /// Retries up to `max_retries` times with exponential backoff when the
    /// error is retryable (connection errors, serialization failures).
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    log::warn!(
                        "Retrying database operation (attempt {} of {})",
                        attempt + 1,
                        max_retries + 1
                    );
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn load_links(
    conn: &mut PgConnection,
    reduction_ids: &[i64],
) -> RepositoryResult<HashMap<i64, Vec<i64>>> {
    let links: Vec<ReductionClassificationRow> = target_reduction_classifications::table
        .filter(target_reduction_classifications::reduction_id.eq_any(reduction_ids))
        .order((
            target_reduction_classifications::reduction_id,
            target_reduction_classifications::classification_id,
        ))
        .select(ReductionClassificationRow::as_select())
        .load(conn)
        .map_err(map_diesel_error)?;

    let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
    for link in links {
        grouped
            .entry(link.reduction_id)
            .or_default()
            .push(link.classification_id);
    }
    Ok(grouped)
}

fn assemble_reductions(
    conn: &mut PgConnection,
    rows: Vec<ReductionRow>,
) -> RepositoryResult<Vec<Reduction>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut links = load_links(conn, &ids)?;
    rows.into_iter()
        .map(|row| {
            let classification_ids = links.remove(&row.id).unwrap_or_default();
            row.into_reduction(classification_ids)
        })
        .collect()
}

#[async_trait]
impl ClassificationRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn store_target(&self, target: &NewTarget) -> RepositoryResult<Target> {
        let target = target.clone();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let existing = targets::table
                    .filter(targets::survey.eq(&target.survey))
                    .filter(targets::identifier.eq(&target.identifier))
                    .select(TargetRow::as_select())
                    .first::<TargetRow>(tx)
                    .optional()
                    .map_err(map_diesel_error)?;
                if let Some(row) = existing {
                    return row.into_target();
                }

                diesel::insert_into(targets::table)
                    .values(&NewTargetRow {
                        identifier: target.identifier.clone(),
                        survey: target.survey.clone(),
                        fetch_method: target.fetch_method.map(|m| m.as_str().to_string()),
                    })
                    .returning(TargetRow::as_returning())
                    .get_result::<TargetRow>(tx)
                    .map_err(map_diesel_error)?
                    .into_target()
            })
        })
        .await
    }

    async fn store_subject(&self, subject: &Subject) -> RepositoryResult<bool> {
        let row = SubjectRow::from(subject);
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let target_exists: bool =
                    diesel::select(exists(targets::table.filter(targets::id.eq(row.target_id))))
                        .get_result(tx)
                        .map_err(map_diesel_error)?;
                if !target_exists {
                    return Err(RepositoryError::validation_with_context(
                        format!("Target {} not found", row.target_id),
                        ErrorContext::new("store_subject")
                            .with_entity("subject")
                            .with_entity_id(row.id),
                    ));
                }

                let inserted = diesel::insert_into(subjects::table)
                    .values(&row)
                    .on_conflict_do_nothing()
                    .execute(tx)
                    .map_err(map_diesel_error)?;
                Ok(inserted == 1)
            })
        })
        .await
    }

    async fn store_classifications(
        &self,
        classifications: &[Classification],
    ) -> RepositoryResult<usize> {
        if classifications.is_empty() {
            return Ok(0);
        }
        let rows: Vec<NewClassificationRow> =
            classifications.iter().map(NewClassificationRow::from).collect();

        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let wanted: HashSet<i64> = rows.iter().map(|r| r.subject_id).collect();
                let wanted: Vec<i64> = wanted.into_iter().collect();
                let known: HashSet<i64> = subjects::table
                    .filter(subjects::id.eq_any(&wanted))
                    .select(subjects::id)
                    .load::<i64>(tx)
                    .map_err(map_diesel_error)?
                    .into_iter()
                    .collect();
                if let Some(missing) = wanted.iter().find(|id| !known.contains(id)) {
                    return Err(RepositoryError::validation_with_context(
                        format!("Subject {} not found", missing),
                        ErrorContext::new("store_classifications").with_entity("subject"),
                    ));
                }

                let mut inserted = 0;
                for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                    inserted += diesel::insert_into(classifications::table)
                        .values(chunk)
                        .on_conflict_do_nothing()
                        .execute(tx)
                        .map_err(map_diesel_error)?;
                }
                Ok(inserted)
            })
        })
        .await
    }

    async fn get_target(&self, target_id: TargetId) -> RepositoryResult<Target> {
        self.with_conn(move |conn| {
            targets::table
                .find(target_id.value())
                .select(TargetRow::as_select())
                .first::<TargetRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| {
                    RepositoryError::not_found_with_context(
                        format!("Target {} not found", target_id),
                        ErrorContext::new("get_target")
                            .with_entity("target")
                            .with_entity_id(target_id),
                    )
                })?
                .into_target()
        })
        .await
    }

    async fn list_targets(&self) -> RepositoryResult<Vec<Target>> {
        self.with_conn(|conn| {
            targets::table
                .order(targets::id)
                .select(TargetRow::as_select())
                .load::<TargetRow>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(TargetRow::into_target)
                .collect()
        })
        .await
    }

    async fn list_subjects(&self, target_id: TargetId) -> RepositoryResult<Vec<Subject>> {
        self.with_conn(move |conn| {
            Ok(subjects::table
                .filter(subjects::target_id.eq(target_id.value()))
                .order(subjects::id)
                .select(SubjectRow::as_select())
                .load::<SubjectRow>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(Subject::from)
                .collect())
        })
        .await
    }

    fn stream_classifications(
        &self,
        target_id: TargetId,
    ) -> BoxStream<'_, RepositoryResult<Classification>> {
        Box::pin(async_stream::try_stream! {
            let mut after = i64::MIN;
            loop {
                let page: Vec<ClassificationRow> = self
                    .with_conn(move |conn| {
                        classifications::table
                            .filter(
                                classifications::subject_id.eq_any(
                                    subjects::table
                                        .filter(subjects::target_id.eq(target_id.value()))
                                        .select(subjects::id),
                                ),
                            )
                            .filter(classifications::id.gt(after))
                            .order(classifications::id)
                            .limit(STREAM_PAGE_SIZE)
                            .select(ClassificationRow::as_select())
                            .load(conn)
                            .map_err(map_diesel_error)
                    })
                    .await?;

                let exhausted = (page.len() as i64) < STREAM_PAGE_SIZE;
                if let Some(last) = page.last() {
                    after = last.id;
                }
                for row in page {
                    yield Classification::from(row);
                }
                if exhausted {
                    break;
                }
            }
        })
    }

    async fn has_classifications_created_after(
        &self,
        target_id: TargetId,
        after: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            diesel::select(exists(
                classifications::table
                    .inner_join(subjects::table)
                    .filter(subjects::target_id.eq(target_id.value()))
                    .filter(classifications::created.gt(after)),
            ))
            .get_result(conn)
            .map_err(map_diesel_error)
        })
        .await
    }

    async fn subject_annotation_count(&self, subject_id: SubjectId) -> RepositoryResult<usize> {
        self.with_conn(move |conn| {
            classifications::table
                .filter(classifications::subject_id.eq(subject_id.value()))
                .count()
                .get_result::<i64>(conn)
                .map(|n| n as usize)
                .map_err(map_diesel_error)
        })
        .await
    }
}

#[async_trait]
impl ReductionRepository for PostgresRepository {
    async fn create_reduction(&self, draft: &ReductionDraft) -> RepositoryResult<Reduction> {
        let reduced_annotations = serde_json::to_value(&draft.reduced_annotations).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Failed to encode reduced annotations: {}", e),
                ErrorContext::new("create_reduction")
                    .with_entity("target")
                    .with_entity_id(draft.target_id),
            )
        })?;
        let target_id = draft.target_id.value();
        let classification_ids: Vec<i64> =
            draft.classification_ids.iter().map(|id| id.value()).collect();

        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let row: ReductionRow = diesel::insert_into(target_reductions::table)
                    .values(&NewReductionRow {
                        target_id,
                        reduced_annotations: reduced_annotations.clone(),
                    })
                    .returning(ReductionRow::as_returning())
                    .get_result(tx)
                    .map_err(map_diesel_error)?;

                let links: Vec<ReductionClassificationRow> = classification_ids
                    .iter()
                    .map(|&classification_id| ReductionClassificationRow {
                        reduction_id: row.id,
                        classification_id,
                    })
                    .collect();
                for chunk in links.chunks(INSERT_CHUNK_SIZE) {
                    diesel::insert_into(target_reduction_classifications::table)
                        .values(chunk)
                        .on_conflict_do_nothing()
                        .execute(tx)
                        .map_err(map_diesel_error)?;
                }

                row.into_reduction(classification_ids.clone())
            })
        })
        .await
    }

    async fn latest_reduction(&self, target_id: TargetId) -> RepositoryResult<Option<Reduction>> {
        self.with_conn(move |conn| {
            let row = target_reductions::table
                .filter(target_reductions::target_id.eq(target_id.value()))
                .order((target_reductions::created.desc(), target_reductions::id.desc()))
                .select(ReductionRow::as_select())
                .first::<ReductionRow>(conn)
                .optional()
                .map_err(map_diesel_error)?;
            match row {
                Some(row) => Ok(assemble_reductions(conn, vec![row])?.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_reductions(&self) -> RepositoryResult<Vec<Reduction>> {
        self.with_conn(|conn| {
            let rows = target_reductions::table
                .order(target_reductions::id)
                .select(ReductionRow::as_select())
                .load::<ReductionRow>(conn)
                .map_err(map_diesel_error)?;
            assemble_reductions(conn, rows)
        })
        .await
    }

    async fn delete_reduction(&self, reduction_id: ReductionId) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(
                    target_reduction_classifications::table.filter(
                        target_reduction_classifications::reduction_id.eq(reduction_id.value()),
                    ),
                )
                .execute(tx)
                .map_err(map_diesel_error)?;
                let deleted = diesel::delete(target_reductions::table.find(reduction_id.value()))
                    .execute(tx)
                    .map_err(map_diesel_error)?;
                Ok(deleted > 0)
            })
        })
        .await
    }

    async fn reduced_target_ids(&self) -> RepositoryResult<HashSet<TargetId>> {
        self.with_conn(|conn| {
            Ok(target_reductions::table
                .select(target_reductions::target_id)
                .distinct()
                .load::<i64>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(TargetId)
                .collect())
        })
        .await
    }
}

#[async_trait]
impl PhotometryRepository for PostgresRepository {
    async fn store_light_curve(
        &self,
        target_id: TargetId,
        series: &TimeSeries,
    ) -> RepositoryResult<usize> {
        let rows: Vec<PhotometrySampleRow> = series
            .samples()
            .iter()
            .enumerate()
            .map(|(i, s)| PhotometrySampleRow {
                target_id: target_id.value(),
                sample_index: i as i32,
                time_jd: s.time.value(),
                flux: s.flux,
                flux_err: s.flux_err,
            })
            .collect();

        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(
                    photometry_samples::table
                        .filter(photometry_samples::target_id.eq(target_id.value())),
                )
                .execute(tx)
                .map_err(map_diesel_error)?;

                let mut stored = 0;
                for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                    stored += diesel::insert_into(photometry_samples::table)
                        .values(chunk)
                        .execute(tx)
                        .map_err(map_diesel_error)?;
                }
                Ok(stored)
            })
        })
        .await
    }

    async fn get_light_curve(&self, target_id: TargetId) -> RepositoryResult<Option<TimeSeries>> {
        self.with_conn(move |conn| {
            let rows = photometry_samples::table
                .filter(photometry_samples::target_id.eq(target_id.value()))
                .order(photometry_samples::sample_index)
                .select(PhotometrySampleRow::as_select())
                .load::<PhotometrySampleRow>(conn)
                .map_err(map_diesel_error)?;
            if rows.is_empty() {
                return Ok(None);
            }
            Ok(Some(TimeSeries::new(
                rows.into_iter().map(Into::into).collect(),
            )))
        })
        .await
    }
}
