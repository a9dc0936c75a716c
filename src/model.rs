//! Standardization, logistic regression and the training run

use std::path::Path;

use chrono::Utc;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::artifacts::{ArtifactPair, ArtifactStore, ModelArtifact, RunVersion, ScalerArtifact};
use crate::config::TrainConfig;
use crate::data::{self, LabeledRecord};
use crate::encoder::{FeatureEncoder, ImputationMeans};
use crate::error::{ChurnError, Result};
use crate::schema::{self, DECISION_THRESHOLD, SCHEMA_VERSION};

/// Per-feature standardization fitted on the training partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; 1.0 for constant features
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and standard deviations.
    ///
    /// An empty matrix yields zero means and unit scales.
    pub fn fit(features: &Array2<f64>) -> Self {
        let n_features = features.ncols();
        if features.nrows() == 0 {
            return Self {
                mean: vec![0.0; n_features],
                scale: vec![1.0; n_features],
            };
        }

        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = features.std_axis(Axis(0), 0.0).mapv(|std| {
            if std > f64::EPSILON {
                std
            } else {
                1.0
            }
        });

        Self {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
        }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = ArrayView1::from(&self.scale[..]);
        (features - &mean) / &scale
    }

    pub fn transform_row(&self, row: &[f64]) -> Array1<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }
}

/// Numerically stable sigmoid
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

/// Binary logistic regression over standardized features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    /// Full-batch gradient descent with L2 regularization, starting from zero
    /// weights so repeated runs on the same partition are identical.
    ///
    /// # Errors
    /// * `TrainingDiverged` if a weight or the bias stops being finite
    pub fn fit(features: &Array2<f64>, labels: &[bool], cfg: &TrainConfig) -> Result<Self> {
        let n_features = features.ncols();
        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;

        let n = features.nrows();
        if n == 0 {
            return Ok(Self {
                weights: weights.to_vec(),
                bias,
            });
        }

        let targets: Array1<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();
        let n = n as f64;
        let mut prev_loss = f64::MAX;
        let mut epochs_run = 0;

        for epoch in 0..cfg.max_epochs {
            epochs_run = epoch + 1;
            let probs = features.dot(&weights).mapv(|z| sigmoid(z + bias));
            let errors = &probs - &targets;

            let loss = log_loss(&probs, &targets);
            let grad_w = features.t().dot(&errors) / n + &weights * cfg.l2_penalty;
            let grad_b = errors.sum() / n;

            weights.scaled_add(-cfg.learning_rate, &grad_w);
            bias -= cfg.learning_rate * grad_b;

            if !weights.iter().all(|w| w.is_finite()) {
                warn!(epoch, "weights diverged");
                return Err(ChurnError::TrainingDiverged {
                    parameter: "weights",
                });
            }
            if !bias.is_finite() {
                warn!(epoch, "bias diverged");
                return Err(ChurnError::TrainingDiverged { parameter: "bias" });
            }

            if (prev_loss - loss).abs() < cfg.tolerance {
                break;
            }
            prev_loss = loss;
        }

        debug!(epochs = epochs_run, bias, "logistic regression converged");
        Ok(Self {
            weights: weights.to_vec(),
            bias,
        })
    }

    /// Churn probability for one standardized feature row
    pub fn probability(&self, features: ArrayView1<f64>) -> f64 {
        let z = features
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }

    pub fn probabilities(&self, features: &Array2<f64>) -> Array1<f64> {
        features
            .outer_iter()
            .map(|row| self.probability(row))
            .collect()
    }
}

/// Mean binary cross-entropy
fn log_loss(probs: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    let eps = 1e-15;
    let total: f64 = probs
        .iter()
        .zip(targets)
        .map(|(p, y)| -(y * (p + eps).ln() + (1.0 - y) * (1.0 - p + eps).ln()))
        .sum();
    total / probs.len().max(1) as f64
}

/// Hold-out metrics computed on the evaluation partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub log_loss: f64,
}

impl EvalMetrics {
    pub fn compute(probs: &Array1<f64>, labels: &[bool]) -> Option<Self> {
        if probs.is_empty() {
            return None;
        }

        let (mut tp, mut fp, mut tn, mut fne) = (0usize, 0usize, 0usize, 0usize);
        for (&p, &actual) in probs.iter().zip(labels) {
            match (p >= DECISION_THRESHOLD, actual) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fne += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let targets: Array1<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();

        Some(Self {
            accuracy: ratio(tp + tn, probs.len()),
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fne),
            log_loss: log_loss(probs, &targets),
        })
    }
}

/// Row indices of the training and evaluation partitions
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub eval: Vec<usize>,
}

/// Deterministic shuffled split; the first `floor(n * eval_fraction)`
/// shuffled rows are held out.
pub fn split_indices(n_rows: usize, eval_fraction: f64, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_eval = ((n_rows as f64) * eval_fraction).floor() as usize;
    let train = indices.split_off(n_eval);
    Split {
        train,
        eval: indices,
    }
}

/// Fit a scaler and classifier on labeled records and return the tagged pair.
///
/// # Arguments
/// * `records` - Labeled records, at least one
/// * `cfg` - Split and optimizer settings
///
/// # Returns
/// * An `ArtifactPair` whose two halves share a fresh run version
pub fn fit(records: &[LabeledRecord], cfg: &TrainConfig) -> Result<ArtifactPair> {
    cfg.validate()?;
    if records.is_empty() {
        return Err(ChurnError::EmptyDataset);
    }

    let impute_means = ImputationMeans::fit(records)?;
    let encoder = FeatureEncoder::new(impute_means);
    let features = encoder.encode_all(records.iter().map(|labeled| &labeled.record))?;
    let labels: Vec<bool> = records.iter().map(|labeled| labeled.churn).collect();

    let split = split_indices(records.len(), cfg.eval_fraction, cfg.seed);
    let train_x = features.select(Axis(0), &split.train);
    let eval_x = features.select(Axis(0), &split.eval);
    let train_y: Vec<bool> = split.train.iter().map(|&i| labels[i]).collect();
    let eval_y: Vec<bool> = split.eval.iter().map(|&i| labels[i]).collect();

    let scaler = StandardScaler::fit(&train_x);
    let train_scaled = scaler.transform(&train_x);
    let eval_scaled = scaler.transform(&eval_x);

    let classifier = LogisticModel::fit(&train_scaled, &train_y, cfg)?;
    let metrics = EvalMetrics::compute(&classifier.probabilities(&eval_scaled), &eval_y);

    let trained_at = Utc::now();
    let version = RunVersion::generate(trained_at);
    info!(
        version = %version,
        train_rows = split.train.len(),
        eval_rows = split.eval.len(),
        accuracy = metrics.as_ref().map(|m| m.accuracy),
        "model fitted"
    );

    let scaler_artifact = ScalerArtifact {
        version: version.clone(),
        schema_version: SCHEMA_VERSION.to_string(),
        feature_names: schema::feature_names(),
        impute_means,
        scaler,
        trained_at,
    };
    let model_artifact = ModelArtifact {
        version,
        schema_version: SCHEMA_VERSION.to_string(),
        feature_names: schema::feature_names(),
        classifier,
        train_rows: split.train.len(),
        eval_rows: split.eval.len(),
        metrics,
        trained_at,
    };

    ArtifactPair::new(scaler_artifact, model_artifact)
}

/// Load a dataset, fit, and persist the resulting pair as the store's current run.
///
/// Nothing is written unless every step before persistence succeeds.
pub fn train(
    dataset_path: impl AsRef<Path>,
    store: &ArtifactStore,
    cfg: &TrainConfig,
) -> Result<ArtifactPair> {
    let dataset_path = dataset_path.as_ref();
    let _span = info_span!("train", dataset = %dataset_path.display()).entered();

    let records = data::load_dataset(dataset_path)?;
    let pair = fit(&records, cfg)?;
    store.save(&pair)?;
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CustomerRecord;
    use ndarray::array;

    fn labeled(spend: f64, tenure: u32, contract: &str, churn: bool) -> LabeledRecord {
        LabeledRecord::new(
            CustomerRecord {
                customer_id: None,
                gender: Some(if tenure % 2 == 0 { "Male" } else { "Female" }.to_string()),
                contract_type: Some(contract.to_string()),
                avg_monthly_spend: Some(spend),
                days_since_payment: Some(tenure % 40),
                tenure: Some(tenure),
                last_payment_date: None,
            },
            churn,
        )
    }

    fn separable_dataset() -> Vec<LabeledRecord> {
        (0..40)
            .map(|i| {
                if i % 2 == 0 {
                    labeled(90.0 + i as f64, 1 + i % 5, "Month-to-month", true)
                } else {
                    labeled(20.0 + i as f64, 40 + i, "Two year", false)
                }
            })
            .collect()
    }

    #[test]
    fn test_scaler_standardizes_columns() {
        let features = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&features);
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);

        let scaled = scaler.transform(&features);
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
        assert_eq!(scaler.transform_row(&[3.0, 5.0]).to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = split_indices(100, 0.2, 42);
        let b = split_indices(100, 0.2, 42);
        assert_eq!(a, b);
        assert_eq!(a.train.len(), 80);
        assert_eq!(a.eval.len(), 20);

        let mut all: Vec<usize> = a.train.iter().chain(&a.eval).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_single_row_keeps_it_for_training() {
        let split = split_indices(1, 0.2, 42);
        assert_eq!(split.train, vec![0]);
        assert!(split.eval.is_empty());
    }

    #[test]
    fn test_logistic_regression_separates_classes() {
        let features = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let labels = [false, false, false, true, true, true];
        let model = LogisticModel::fit(&features, &labels, &TrainConfig::default()).unwrap();

        assert!(model.weights[0] > 0.0);
        assert!(model.probability(array![2.0].view()) > 0.5);
        assert!(model.probability(array![-2.0].view()) < 0.5);
    }

    #[test]
    fn test_runaway_learning_rate_is_rejected() {
        let cfg = TrainConfig {
            learning_rate: 1e5,
            l2_penalty: 1.0,
            tolerance: 0.0,
            ..TrainConfig::default()
        };
        let result = fit(&separable_dataset(), &cfg);
        assert!(matches!(result, Err(ChurnError::TrainingDiverged { .. })));
    }

    #[test]
    fn test_fit_empty_dataset() {
        let result = fit(&[], &TrainConfig::default());
        assert!(matches!(result, Err(ChurnError::EmptyDataset)));
    }

    #[test]
    fn test_fit_single_row() {
        let records = vec![labeled(50.0, 12, "One year", true)];
        let pair = fit(&records, &TrainConfig::default()).unwrap();
        assert_eq!(pair.model().train_rows, 1);
        assert_eq!(pair.model().eval_rows, 0);
        assert!(pair.model().metrics.is_none());
    }

    #[test]
    fn test_fit_produces_matching_versions_and_metrics() {
        let pair = fit(&separable_dataset(), &TrainConfig::default()).unwrap();
        assert_eq!(pair.scaler().version, pair.model().version);
        assert_eq!(pair.model().train_rows, 32);
        assert_eq!(pair.model().eval_rows, 8);

        let metrics = pair.model().metrics.as_ref().unwrap();
        assert!(metrics.accuracy >= 0.75);
    }

    #[test]
    fn test_fit_is_reproducible() {
        let records = separable_dataset();
        let a = fit(&records, &TrainConfig::default()).unwrap();
        let b = fit(&records, &TrainConfig::default()).unwrap();
        assert_eq!(a.scaler().scaler, b.scaler().scaler);
        assert_eq!(a.model().classifier, b.model().classifier);
    }

    #[test]
    fn test_eval_metrics() {
        let probs = array![0.9, 0.8, 0.2, 0.6];
        let labels = [true, false, false, true];
        let metrics = EvalMetrics::compute(&probs, &labels).unwrap();
        assert_eq!(metrics.accuracy, 0.75);
        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics.recall, 1.0);
        assert!(EvalMetrics::compute(&Array1::zeros(0), &[]).is_none());
    }
}
