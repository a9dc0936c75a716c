//! Scoring single customer records against a trained artifact pair

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use crate::artifacts::{ArtifactPair, ArtifactStore, RunVersion};
use crate::data::CustomerRecord;
use crate::encoder::{FeatureEncoder, FeatureVector};
use crate::error::Result;
use crate::schema::DECISION_THRESHOLD;

/// Churn score for one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// Probability of churn in [0, 1]
    pub probability: f64,
    /// `probability >= 0.5`
    pub label: bool,
}

impl Prediction {
    fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            label: probability >= DECISION_THRESHOLD,
        }
    }
}

/// Immutable scorer built from one artifact pair; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Predictor {
    pair: ArtifactPair,
    encoder: FeatureEncoder,
}

impl Predictor {
    pub fn new(pair: ArtifactPair) -> Self {
        let encoder = FeatureEncoder::new(pair.scaler().impute_means);
        Self { pair, encoder }
    }

    /// Build a predictor from the store's current run.
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        Ok(Self::new(store.load()?))
    }

    pub fn version(&self) -> &RunVersion {
        self.pair.version()
    }

    pub fn artifacts(&self) -> &ArtifactPair {
        &self.pair
    }

    /// Encode a record exactly as training did, before standardization.
    pub fn encode(&self, record: &CustomerRecord) -> Result<FeatureVector> {
        self.encoder.encode(record)
    }

    pub fn predict(&self, record: &CustomerRecord) -> Result<Prediction> {
        let features = self.encoder.encode(record)?;
        let scaled = self.pair.scaler().scaler.transform_row(features.as_slice());
        let probability = self.pair.model().classifier.probability(scaled.view());

        debug!(
            version = %self.version(),
            customer_id = record.customer_id.as_deref().unwrap_or("-"),
            probability,
            "scored record"
        );
        Ok(Prediction::from_probability(probability))
    }
}

/// Score one record with an artifact pair.
pub fn predict(record: &CustomerRecord, artifacts: &ArtifactPair) -> Result<Prediction> {
    Predictor::new(artifacts.clone()).predict(record)
}

/// Holder for the live predictor of a long-running host.
///
/// Readers take a snapshot `Arc` and score against it; `reload` replaces the
/// whole predictor in one step, so a snapshot always belongs to a single run.
#[derive(Debug)]
pub struct SharedPredictor {
    current: RwLock<Arc<Predictor>>,
}

impl SharedPredictor {
    pub fn new(predictor: Predictor) -> Self {
        Self {
            current: RwLock::new(Arc::new(predictor)),
        }
    }

    pub fn load(store: &ArtifactStore) -> Result<Self> {
        Ok(Self::new(Predictor::load(store)?))
    }

    pub fn snapshot(&self) -> Arc<Predictor> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn predict(&self, record: &CustomerRecord) -> Result<Prediction> {
        self.snapshot().predict(record)
    }

    /// Load the store's current run and swap it in. On error the previous
    /// predictor stays live.
    pub fn reload(&self, store: &ArtifactStore) -> Result<RunVersion> {
        let next = Arc::new(Predictor::load(store)?);
        let version = next.version().clone();
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        info!(version = %version, "predictor reloaded");
        Ok(version)
    }
}
