//! ChurnForge: customer churn prediction with a shared feature encoder
//!
//! Training and prediction go through the same [`FeatureEncoder`] and the same
//! feature schema, and the scaler and model produced by one training run are
//! persisted and loaded as a single versioned [`ArtifactPair`].

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod data;
pub mod encoder;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod predict;
pub mod schema;
pub mod viz;

// Re-export public items for easier access
pub use artifacts::{load_pair, ArtifactPair, ArtifactStore, ModelArtifact, RunVersion, ScalerArtifact};
pub use cli::Args;
pub use config::TrainConfig;
pub use data::{load_dataset, load_records, CustomerRecord, LabeledRecord};
pub use encoder::{FeatureEncoder, FeatureVector, ImputationMeans};
pub use error::{ChurnError, Result};
pub use model::{fit, train};
pub use predict::{predict, Prediction, Predictor, SharedPredictor};
pub use viz::generate_report;
