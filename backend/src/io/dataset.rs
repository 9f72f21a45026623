//! JSON dataset files for the command-line driver.
//!
//! A dataset is a flat snapshot of a local store: targets, subjects,
//! classifications, light curves and reductions, each with the ids they had
//! when exported. Loading a dataset and exporting it again yields the same
//! document.

use std::path::Path;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::db::repositories::LocalRepository;
use crate::db::repository::{ClassificationRepository, PhotometryRepository, ReductionRepository};
use crate::models::{Classification, Reduction, Subject, Target, TargetId, TimeSeries};

/// Light curve of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveEntry {
    pub target_id: TargetId,
    pub samples: TimeSeries,
}

/// Serialized contents of a local repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub light_curves: Vec<LightCurveEntry>,
    #[serde(default)]
    pub reductions: Vec<Reduction>,
}

impl Dataset {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid dataset JSON")
    }

    /// Read a dataset from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse dataset {}", path.display()))
    }

    /// Write the dataset as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to encode dataset")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write dataset {}", path.display()))
    }

    /// Build a local repository holding exactly this dataset.
    pub async fn into_repository(self) -> Result<LocalRepository> {
        let repo = LocalRepository::new();

        for target in self.targets {
            let id = target.id;
            repo.restore_target(target)
                .with_context(|| format!("Failed to restore target {}", id))?;
        }
        for subject in &self.subjects {
            repo.store_subject(subject)
                .await
                .with_context(|| format!("Failed to store subject {}", subject.id))?;
        }
        repo.restore_classifications(&self.classifications)
            .context("Failed to restore classifications")?;
        for entry in &self.light_curves {
            repo.store_light_curve(entry.target_id, &entry.samples)
                .await
                .with_context(|| format!("Failed to store light curve of target {}", entry.target_id))?;
        }
        for reduction in self.reductions {
            let id = reduction.id;
            repo.restore_reduction(reduction)
                .with_context(|| format!("Failed to restore reduction {}", id))?;
        }

        Ok(repo)
    }

    /// Snapshot the contents of a local repository.
    pub async fn export(repo: &LocalRepository) -> Result<Self> {
        let targets = repo.list_targets().await?;
        let mut dataset = Dataset::default();

        for target in &targets {
            dataset.subjects.extend(repo.list_subjects(target.id).await?);
            let mut classifications: Vec<Classification> =
                repo.stream_classifications(target.id).try_collect().await?;
            dataset.classifications.append(&mut classifications);
            if let Some(samples) = repo.get_light_curve(target.id).await? {
                dataset.light_curves.push(LightCurveEntry {
                    target_id: target.id,
                    samples,
                });
            }
        }
        dataset.classifications.sort_by_key(|c| c.id);
        dataset.reductions = repo.list_reductions().await?;
        dataset.targets = targets;
        Ok(dataset)
    }
}
