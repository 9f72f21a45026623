//! Pipeline configuration file support.
//!
//! Settings are read from a TOML file (`reduction.toml` by default) and then
//! adjusted by environment variables. Every section is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregation::{BaseGrouper, GroupingStrategy, PeakGrouper, TargetAggregator, MIN_ANNOTATIONS};
use crate::db::factory::RepositoryType;
use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::db::PostgresConfig;
use crate::services::{BatchOptions, DEFAULT_TESS_TRIM_HOURS};

/// Name of the configuration file searched for by [`PipelineConfig::from_default_location`].
pub const CONFIG_FILE_NAME: &str = "reduction.toml";

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub aggregation: AggregationSettings,
    #[serde(default)]
    pub photometry: PhotometrySettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Clustering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSettings {
    #[serde(default = "default_min_annotations")]
    pub min_annotations: usize,
    /// `"peak"` or `"base"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            min_annotations: default_min_annotations(),
            strategy: default_strategy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotometrySettings {
    #[serde(default = "default_tess_trim_hours")]
    pub tess_trim_hours: f64,
}

impl Default for PhotometrySettings {
    fn default() -> Self {
        Self {
            tess_trim_hours: default_tess_trim_hours(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Zero disables the deadline.
    #[serde(default)]
    pub deadline_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deadline_secs: 0,
        }
    }
}

fn default_repo_type() -> String {
    "local".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_min_annotations() -> usize {
    MIN_ANNOTATIONS
}

fn default_strategy() -> String {
    "peak".to_string()
}

fn default_tess_trim_hours() -> f64 {
    DEFAULT_TESS_TRIM_HOURS
}

fn default_concurrency() -> usize {
    1
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Returns
    /// * `Err(RepositoryError::ConfigurationError)` if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> RepositoryResult<Self> {
        toml::from_str(content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `reduction.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// Falls back to defaults when no file exists.
    pub fn from_default_location() -> RepositoryResult<Self> {
        let search_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("backend").join(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ];

        match search_paths.iter().find(|p| p.exists()) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> RepositoryResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognised variables: `REPOSITORY_TYPE`, `DATABASE_URL` (or
    /// `PG_DATABASE_URL`), `MIN_ANNOTATIONS`, `BATCH_CONCURRENCY` and
    /// `BATCH_DEADLINE_SECS`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> RepositoryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(repo_type) = lookup("REPOSITORY_TYPE") {
            self.repository.repo_type = repo_type;
        }
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("PG_DATABASE_URL")) {
            self.postgres.database_url = url;
        }
        if let Some(value) = lookup("MIN_ANNOTATIONS") {
            self.aggregation.min_annotations = parse_var("MIN_ANNOTATIONS", &value)?;
        }
        if let Some(value) = lookup("BATCH_CONCURRENCY") {
            self.batch.concurrency = parse_var("BATCH_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("BATCH_DEADLINE_SECS") {
            self.batch.deadline_secs = parse_var("BATCH_DEADLINE_SECS", &value)?;
        }
        Ok(self)
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> RepositoryResult<RepositoryType> {
        RepositoryType::from_str(&self.repository.repo_type).map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })
    }

    /// Postgres connection settings, or `None` for other repository types.
    pub fn to_postgres_config(&self) -> RepositoryResult<Option<PostgresConfig>> {
        if self.repository_type()? != RepositoryType::Postgres {
            return Ok(None);
        }

        if self.postgres.database_url.is_empty() {
            return Err(RepositoryError::configuration(
                "Postgres repository requires 'postgres.database_url' setting",
            ));
        }

        Ok(Some(PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
            min_pool_size: self.postgres.min_connections,
            connection_timeout_sec: self.postgres.connect_timeout,
            idle_timeout_sec: self.postgres.idle_timeout,
            max_retries: self.postgres.max_retries,
            retry_delay_ms: self.postgres.retry_delay_ms,
        }))
    }

    /// The grouping strategy named by `aggregation.strategy`.
    pub fn build_strategy(&self) -> RepositoryResult<Arc<dyn GroupingStrategy>> {
        match self.aggregation.strategy.to_lowercase().as_str() {
            "peak" => Ok(Arc::new(PeakGrouper::new())),
            "base" => Ok(Arc::new(BaseGrouper)),
            other => Err(RepositoryError::configuration(format!(
                "Unknown grouping strategy: {}",
                other
            ))),
        }
    }

    pub fn build_aggregator(&self) -> RepositoryResult<TargetAggregator> {
        Ok(TargetAggregator::new(self.build_strategy()?)
            .with_min_annotations(self.aggregation.min_annotations))
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.batch.concurrency.max(1),
            deadline: (self.batch.deadline_secs > 0)
                .then(|| Duration::from_secs(self.batch.deadline_secs)),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> RepositoryResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        RepositoryError::configuration(format!("Invalid {} '{}': {}", name, value, e))
    })
}
