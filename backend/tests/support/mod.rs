#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::json;

use sl_tom_reduction::db::repository::{ClassificationRepository, PhotometryRepository};
use sl_tom_reduction::db::LocalRepository;
use sl_tom_reduction::models::{
    Classification, ClassificationId, FetchMethod, NewTarget, PhotometrySample, Subject,
    SubjectId, Target, TargetId, TimeSeries,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores variables on unwind and serializes access to the process
/// environment, since tests run in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Register a target with one subject, whose id is `target_id * 100`.
pub async fn seed_target(
    repo: &LocalRepository,
    identifier: &str,
    fetch_method: Option<FetchMethod>,
) -> Target {
    let target = repo
        .store_target(&NewTarget {
            identifier: identifier.to_string(),
            survey: "TESS".to_string(),
            fetch_method,
        })
        .await
        .unwrap();
    repo.store_subject(&Subject {
        id: subject_of(target.id),
        target_id: target.id,
        sequence: "1".to_string(),
        data_url: None,
        start_time: None,
        end_time: None,
        metadata: json!({}),
        created: target.created,
    })
    .await
    .unwrap();
    target
}

pub fn subject_of(target_id: TargetId) -> SubjectId {
    SubjectId(target_id.value() * 100)
}

/// A classification marking `[x - width, x + width]`.
pub fn mark(id: i64, subject_id: SubjectId, x: f64, width: f64, created: DateTime<Utc>) -> Classification {
    Classification {
        id: ClassificationId(id),
        subject_id,
        user_id: Some(id),
        timestamp: created,
        annotation: json!([{"task": "T0", "value": [{"x": x, "width": width}]}]),
        created,
    }
}

/// A classification where the volunteer marked nothing.
pub fn empty_mark(id: i64, subject_id: SubjectId, created: DateTime<Utc>) -> Classification {
    Classification {
        id: ClassificationId(id),
        subject_id,
        user_id: Some(id),
        timestamp: created,
        annotation: json!([{"task": "T0", "value": []}]),
        created,
    }
}

/// Store marks on the target's subject with consecutive ids starting at `first_id`.
pub async fn add_marks(
    repo: &LocalRepository,
    target: &Target,
    first_id: i64,
    marks: &[(f64, f64)],
) -> Vec<ClassificationId> {
    let now = Utc::now();
    let classifications: Vec<Classification> = marks
        .iter()
        .enumerate()
        .map(|(i, &(x, w))| mark(first_id + i as i64, subject_of(target.id), x, w, now))
        .collect();
    repo.store_classifications(&classifications).await.unwrap();
    classifications.iter().map(|c| c.id).collect()
}

/// Flat light curve sampled every `step` days on `[start, end]`, with bumps
/// of the given height at the given times.
pub fn light_curve(start: f64, end: f64, step: f64, bumps: &[(f64, f64)]) -> TimeSeries {
    let n = ((end - start) / step).round() as usize;
    let samples = (0..=n)
        .map(|i| {
            let t = start + i as f64 * step;
            let flux = 1.0
                + bumps
                    .iter()
                    .map(|&(at, height)| height * (-((t - at) / 0.05).powi(2)).exp())
                    .sum::<f64>();
            PhotometrySample::new(t, flux, 0.001)
        })
        .collect();
    TimeSeries::new(samples)
}

pub async fn store_curve(repo: &LocalRepository, target: &Target, series: &TimeSeries) {
    repo.store_light_curve(target.id, series).await.unwrap();
}
