//! Core domain types for the AutoML client
//!
//! Resource identifiers are opaque string handles minted by the remote
//! service; the client stores and echoes them but never parses them.

use crate::error::{AutomlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier returned by the service
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id! {
    /// Handle for an uploaded dataset
    DatasetId
}

opaque_id! {
    /// Handle for a running or finished pipeline task
    TaskId
}

opaque_id! {
    /// Handle for a pipeline report artifact
    ReportId
}

/// Column names of an uploaded dataset
///
/// Refetched whenever the dataset id changes; an empty column list is a
/// valid result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(default)]
    pub columns: Vec<String>,
}

impl DatasetMetadata {
    /// Create metadata from a list of column names
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Check whether a column is present
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Kind of learning problem the pipeline solves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Classification,
    Regression,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Classification => write!(f, "classification"),
            TaskType::Regression => write!(f, "regression"),
        }
    }
}

/// The fixed catalog of model kinds the service can train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    RandomForest,
    LogisticRegression,
    LinearRegression,
    Xgboost,
    LightGbm,
}

impl ModelKind {
    /// The name the service uses on the wire and in listings
    pub fn api_name(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random Forest",
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::LinearRegression => "Linear Regression",
            ModelKind::Xgboost => "XGBoost",
            ModelKind::LightGbm => "LightGBM",
        }
    }

    /// Look up a model kind by its wire name
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "Random Forest" => Some(ModelKind::RandomForest),
            "Logistic Regression" => Some(ModelKind::LogisticRegression),
            "Linear Regression" => Some(ModelKind::LinearRegression),
            "XGBoost" => Some(ModelKind::Xgboost),
            "LightGBM" => Some(ModelKind::LightGbm),
            _ => None,
        }
    }

    /// The model kinds valid for a given task type
    pub fn catalog(task_type: TaskType) -> &'static [ModelKind] {
        match task_type {
            TaskType::Classification => &[
                ModelKind::RandomForest,
                ModelKind::LogisticRegression,
                ModelKind::Xgboost,
                ModelKind::LightGbm,
            ],
            TaskType::Regression => &[
                ModelKind::RandomForest,
                ModelKind::LinearRegression,
                ModelKind::Xgboost,
                ModelKind::LightGbm,
            ],
        }
    }

    /// Whether this model kind can be trained for the given task type
    pub fn supports(&self, task_type: TaskType) -> bool {
        Self::catalog(task_type).contains(self)
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

/// User-supplied configuration for one pipeline run
///
/// Mutable until submission; the lifecycle freezes a copy when the run is
/// submitted so later edits cannot affect an in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Display name for the dataset in run listings
    pub dataset_name: String,
    /// Field separator of the uploaded file, a single character
    pub sep: String,
    /// Learning problem kind
    pub task_type: TaskType,
    /// Column the model predicts
    pub target_column: String,
    /// Which model to train
    pub model_name: ModelKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_name: "dataset".to_string(),
            sep: ",".to_string(),
            task_type: TaskType::Classification,
            target_column: String::new(),
            model_name: ModelKind::RandomForest,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration against the dataset's known columns
    ///
    /// Runs entirely client-side before any request is sent. `metadata` is
    /// the most recent fetch for the dataset being submitted; when the
    /// service reported no columns the membership check is skipped (an empty
    /// column list is valid metadata).
    pub fn validate(&self, metadata: Option<&DatasetMetadata>) -> Result<()> {
        if self.target_column.is_empty() {
            return Err(AutomlError::Validation(
                "target column must not be empty".to_string(),
            ));
        }

        if self.sep.chars().count() != 1 {
            return Err(AutomlError::Validation(format!(
                "separator must be a single character, got {:?}",
                self.sep
            )));
        }

        if !self.model_name.supports(self.task_type) {
            return Err(AutomlError::Validation(format!(
                "model {} is not available for {} tasks",
                self.model_name, self.task_type
            )));
        }

        if let Some(meta) = metadata {
            if !meta.columns.is_empty() && !meta.has_column(&self.target_column) {
                return Err(AutomlError::Validation(format!(
                    "target column {:?} is not a column of the dataset",
                    self.target_column
                )));
            }
        }

        Ok(())
    }
}

/// Status of a remote pipeline task, as reported by the service
///
/// Only the service mutates task status; the client observes snapshots.
/// Anything outside the known terminal set keeps polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed(String),
    /// A status string this client version does not recognize (non-terminal)
    Other(String),
}

impl TaskStatus {
    /// Parse a status string from the service
    ///
    /// The service reports success as "Completed" and failure as an
    /// "Error: …" string; both spellings are normalized here.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Pending" => TaskStatus::Pending,
            "Running" => TaskStatus::Running,
            "Completed" | "Succeeded" => TaskStatus::Succeeded,
            "Failed" => TaskStatus::Failed("task failed".to_string()),
            other if other.starts_with("Error") => TaskStatus::Failed(other.to_string()),
            other => TaskStatus::Other(other.to_string()),
        }
    }

    /// Whether no further status change is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed(_))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::Running => write!(f, "Running"),
            TaskStatus::Succeeded => write!(f, "Succeeded"),
            TaskStatus::Failed(msg) => write!(f, "Failed: {}", msg),
            TaskStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// One entry in the dataset registry listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    #[serde(rename = "file_id")]
    pub id: DatasetId,
    pub filename: String,
}

/// One row in the pipeline run history listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub task_id: TaskId,
    pub report_id: ReportId,
    pub status: String,
    pub dataset_name: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
}

/// Identifiers returned by a successful dataset upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub dataset_id: DatasetId,
    pub filename: String,
}

/// Identifier pair returned by a successful pipeline submission
///
/// The two ids are produced together by the service or not at all; a
/// report id is never observed without its paired task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub task_id: TaskId,
    pub report_id: ReportId,
}

/// A fetched report artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub data: serde_json::Value,
}

impl ReportPayload {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }
}

/// Predictions returned by applying a trained model to new data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub data: serde_json::Value,
}

impl Predictions {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }
}
