//! Typed errors for encoding, training, artifact storage and prediction

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the churn core can report. None of these are retried.
#[derive(Debug, Error)]
pub enum ChurnError {
    #[error("data source not found at {}", path.display())]
    DataSourceNotFound { path: PathBuf },

    #[error("failed to read data source {}: {source}", path.display())]
    DataSource {
        path: PathBuf,
        #[source]
        source: polars::prelude::PolarsError,
    },

    #[error("required column '{column}' is missing from the data source")]
    MissingColumn { column: String },

    #[error("dataset has no usable rows")]
    EmptyDataset,

    #[error("row {row} has no churn label")]
    MissingLabel { row: usize },

    #[error("feature '{feature}' has no observed values to compute a mean from")]
    NoObservedValues { feature: &'static str },

    #[error("unknown category '{value}' for field '{field}'")]
    UnknownCategory { field: &'static str, value: String },

    #[error("categorical field '{field}' is missing")]
    MissingCategory { field: &'static str },

    #[error("invalid value {value} for numeric field '{field}'")]
    InvalidNumeric { field: &'static str, value: f64 },

    #[error("row {row} has non-numeric value '{value}' in column '{column}'")]
    MalformedNumeric {
        column: &'static str,
        row: usize,
        value: String,
    },

    #[error("training diverged: fitted {parameter} is not finite")]
    TrainingDiverged { parameter: &'static str },

    #[error("model artifacts not found at {}", path.display())]
    ArtifactsNotFound { path: PathBuf },

    #[error("scaler artifact is from run {scaler} but model artifact is from run {model}")]
    ArtifactMismatch { scaler: String, model: String },

    #[error("artifact schema {found} does not match feature schema {expected}")]
    SchemaMismatch { expected: String, found: String },

    #[error("artifact {} is unreadable: {source}", path.display())]
    ArtifactCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize artifact {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("run {version} already exists in the artifact store")]
    RunExists { version: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChurnError {
    /// True for failures that mean "no model is available" to a presentation layer.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(
            self,
            ChurnError::ArtifactsNotFound { .. }
                | ChurnError::ArtifactMismatch { .. }
                | ChurnError::SchemaMismatch { .. }
                | ChurnError::ArtifactCorrupt { .. }
        )
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ChurnError>;
