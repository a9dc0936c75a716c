//! Training hyperparameters

use crate::error::{ChurnError, Result};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_EVAL_FRACTION: f64 = 0.2;
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_MAX_EPOCHS: usize = 1000;
pub const DEFAULT_L2_PENALTY: f64 = 1e-4;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Settings for one training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Seed for the train/evaluation shuffle
    pub seed: u64,
    /// Share of rows held out for evaluation, in [0, 1)
    pub eval_fraction: f64,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub l2_penalty: f64,
    /// Stop once the loss improves by less than this between epochs
    pub tolerance: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            eval_fraction: DEFAULT_EVAL_FRACTION,
            learning_rate: DEFAULT_LEARNING_RATE,
            max_epochs: DEFAULT_MAX_EPOCHS,
            l2_penalty: DEFAULT_L2_PENALTY,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.eval_fraction) {
            return Err(ChurnError::InvalidConfig(format!(
                "eval fraction must be in [0, 1), got {}",
                self.eval_fraction
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ChurnError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_epochs == 0 {
            return Err(ChurnError::InvalidConfig(
                "max epochs must be at least 1".to_string(),
            ));
        }
        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return Err(ChurnError::InvalidConfig(format!(
                "l2 penalty must be non-negative, got {}",
                self.l2_penalty
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ChurnError::InvalidConfig(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}
