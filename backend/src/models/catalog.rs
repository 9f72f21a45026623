//! Targets, subjects and classifications imported from the crowdsourcing platform.
//!
//! A [`Target`] is the astrophysical object; each [`Subject`] is one light-curve
//! chart shown to volunteers; each [`Classification`] is one volunteer's
//! submission on a subject. The time-range mark used by the aggregation engine
//! is extracted from a classification's raw annotation JSON as an [`Annotation`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::define_id_type;

define_id_type!(i64, TargetId);
define_id_type!(i64, SubjectId);
define_id_type!(i64, ClassificationId);

/// How photometry for a survey's targets is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMethod {
    /// TESS SPOC light curves.
    Tess,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Tess => "TESS",
        }
    }
}

impl std::str::FromStr for FetchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TESS" => Ok(FetchMethod::Tess),
            other => Err(format!("Unknown fetch method: {}", other)),
        }
    }
}

/// An astrophysical object under study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    /// Survey-specific identifier (e.g. a TIC number).
    pub identifier: String,
    /// Name of the survey the target belongs to.
    pub survey: String,
    /// `None` when the survey has no way of fetching photometry.
    pub fetch_method: Option<FetchMethod>,
    pub created: DateTime<Utc>,
}

/// Fields needed to register a target; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTarget {
    pub identifier: String,
    pub survey: String,
    #[serde(default)]
    pub fetch_method: Option<FetchMethod>,
}

/// One light-curve chart shown on the crowdsourcing platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Platform subject id.
    pub id: SubjectId,
    pub target_id: TargetId,
    /// Sector, data release, etc.
    pub sequence: String,
    #[serde(default)]
    pub data_url: Option<String>,
    /// Earliest time in the light curve.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Latest time in the light curve.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
    pub created: DateTime<Utc>,
}

/// One volunteer's submission on one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Platform classification id.
    pub id: ClassificationId,
    pub subject_id: SubjectId,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// When the classification was made on the platform.
    pub timestamp: DateTime<Utc>,
    /// Raw annotation payload, a list of task entries.
    pub annotation: Value,
    /// When the classification entered the store.
    pub created: DateTime<Utc>,
}

impl Classification {
    /// Extract the time-range mark from the raw annotation.
    ///
    /// Only the first mark of the first task is used. Returns `None` when the
    /// volunteer marked nothing or the mark lacks numeric `x`/`width`.
    pub fn annotation(&self) -> Option<Annotation> {
        let mark = self
            .annotation
            .get(0)?
            .get("value")?
            .as_array()?
            .first()?;
        let x = mark.get("x")?.as_f64()?;
        let width = mark.get("width")?.as_f64()?;
        if !x.is_finite() || !width.is_finite() {
            return None;
        }
        Some(Annotation {
            classification_id: self.id,
            x,
            width,
            created: self.created,
        })
    }
}

/// A volunteer's marked time range for a suspected event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub classification_id: ClassificationId,
    /// Centre time (Julian Date).
    pub x: f64,
    /// Half-width of the marked range, in days.
    pub width: f64,
    pub created: DateTime<Utc>,
}

impl Annotation {
    pub fn x_min(&self) -> f64 {
        self.x - self.width
    }

    pub fn x_max(&self) -> f64 {
        self.x + self.width
    }
}
