//! Configuration loading and a configured pipeline over a dataset file.

mod support;

use std::time::Duration;

use sl_tom_reduction::config::PipelineConfig;
use sl_tom_reduction::db::repository::{ReductionRepository, RepositoryError};
use sl_tom_reduction::db::{ClassificationRepository, RepositoryFactory, RepositoryType};
use sl_tom_reduction::io::{Dataset, LightCurveEntry};
use sl_tom_reduction::models::FetchMethod;
use sl_tom_reduction::services::{run_maintenance, SurveyTimeSeriesProvider};

use support::{light_curve, mark, subject_of, with_scoped_env};

const CONFIG: &str = r#"
[repository]
type = "local"

[aggregation]
min_annotations = 3
strategy = "peak"

[photometry]
tess_trim_hours = 0.0

[batch]
concurrency = 2
deadline_secs = 600
"#;

#[test]
fn test_file_then_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reduction.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = with_scoped_env(
        &[
            ("MIN_ANNOTATIONS", Some(" 7 ")),
            ("BATCH_CONCURRENCY", None),
            ("BATCH_DEADLINE_SECS", Some("0")),
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || PipelineConfig::from_file(&path).unwrap().with_env_overrides(),
    )
    .unwrap();

    assert_eq!(config.aggregation.min_annotations, 7);
    assert_eq!(config.photometry.tess_trim_hours, 0.0);
    assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);

    let options = config.batch_options();
    assert_eq!(options.concurrency, 2);
    assert_eq!(options.deadline, None);
    assert_eq!(config.build_aggregator().unwrap().min_annotations(), 7);
}

#[test]
fn test_deadline_from_file() {
    let config = PipelineConfig::from_toml_str(CONFIG).unwrap();
    assert_eq!(config.batch_options().deadline, Some(Duration::from_secs(600)));
}

#[test]
fn test_postgres_from_environment_needs_url() {
    let result = with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("postgres")),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || PipelineConfig::default().with_env_overrides(),
    );
    let config = result.unwrap();
    assert!(matches!(
        config.to_postgres_config(),
        Err(RepositoryError::ConfigurationError { .. })
    ));
}

#[test]
fn test_postgres_url_fallback_variable() {
    let config = with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("pg")),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", Some("postgres://reducer@db/sltom")),
        ],
        || PipelineConfig::default().with_env_overrides(),
    )
    .unwrap();

    let pg = config.to_postgres_config().unwrap().unwrap();
    assert_eq!(pg.database_url, "postgres://reducer@db/sltom");
}

#[test]
fn test_garbage_override_is_rejected() {
    let result = with_scoped_env(&[("BATCH_CONCURRENCY", Some("many"))], || {
        PipelineConfig::default().with_env_overrides()
    });
    assert!(result.is_err());
}

#[test]
fn test_unreadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(err.to_string().contains("missing.toml"));
}

#[tokio::test]
async fn test_factory_builds_local_repository_from_config() {
    let config = PipelineConfig::from_toml_str(CONFIG).unwrap();
    let repo = RepositoryFactory::from_config(&config).await.unwrap();
    assert!(repo.health_check().await.unwrap());
    assert!(repo.list_targets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_run_over_dataset_file() {
    let created = chrono::Utc::now() - chrono::Duration::hours(1);
    let mut dataset = Dataset::default();
    dataset.targets.push(sl_tom_reduction::models::Target {
        id: sl_tom_reduction::models::TargetId(4),
        identifier: "TIC 4".to_string(),
        survey: "TESS".to_string(),
        fetch_method: Some(FetchMethod::Tess),
        created,
    });
    let target_id = dataset.targets[0].id;
    dataset.subjects.push(sl_tom_reduction::models::Subject {
        id: subject_of(target_id),
        target_id,
        sequence: "31".to_string(),
        data_url: None,
        start_time: None,
        end_time: None,
        metadata: serde_json::json!({}),
        created,
    });
    for (i, x) in [99.99, 100.0, 100.01].into_iter().enumerate() {
        dataset
            .classifications
            .push(mark(i as i64 + 1, subject_of(target_id), x, 0.1, created));
    }
    dataset.light_curves.push(LightCurveEntry {
        target_id,
        samples: light_curve(99.0, 101.0, 0.01, &[(100.0, 2.0)]),
    });

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("annotations.json");
    let output = dir.path().join("reduced.json");
    dataset.save(&input).unwrap();

    let config = PipelineConfig::from_toml_str(CONFIG).unwrap();
    let repo = std::sync::Arc::new(Dataset::load(&input).unwrap().into_repository().await.unwrap());
    let provider = SurveyTimeSeriesProvider::new(repo.clone())
        .with_tess_trim_hours(config.photometry.tess_trim_hours);
    let report = run_maintenance(
        repo.as_ref(),
        &config.build_aggregator().unwrap(),
        &provider,
        &config.batch_options(),
    )
    .await
    .unwrap();
    assert_eq!(report.batch.created, 1);

    Dataset::export(&repo).await.unwrap().save(&output).unwrap();
    let reloaded = Dataset::load(&output).unwrap();
    assert_eq!(reloaded.targets, dataset.targets);
    assert_eq!(
        reloaded.classifications.iter().map(|c| c.id).collect::<Vec<_>>(),
        dataset.classifications.iter().map(|c| c.id).collect::<Vec<_>>()
    );
    assert_eq!(reloaded.reductions.len(), 1);

    let reduction = reloaded.reductions[0].clone();
    assert_eq!(reduction.target_id, target_id);
    assert_eq!(reduction.reduced_annotations.annotation_count, vec![3]);

    let restored = reloaded.into_repository().await.unwrap();
    assert_eq!(
        restored.latest_reduction(target_id).await.unwrap().map(|r| r.id),
        Some(reduction.id)
    );
}
