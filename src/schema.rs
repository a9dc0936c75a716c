//! Feature schema shared by training and prediction
//!
//! The order of [`FEATURE_NAMES`] is the order of every feature vector, scaler
//! statistic and model weight in this crate. Bump [`SCHEMA_VERSION`] whenever
//! it changes so that artifacts written under the old layout are rejected.

use crate::error::{ChurnError, Result};

/// Version tag recorded in both artifacts of a training run.
pub const SCHEMA_VERSION: &str = "churn-features-v1";

/// Number of encoded features.
pub const N_FEATURES: usize = 6;

/// Number of numeric (imputable) features; they lead the vector.
pub const N_NUMERIC: usize = 3;

/// Encoded feature names in vector order.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "avg_monthly_spend",
    "days_since_payment",
    "tenure",
    "gender_Male",
    "contract_type_One year",
    "contract_type_Two year",
];

/// Numeric feature names, a prefix of [`FEATURE_NAMES`].
pub const NUMERIC_FEATURES: [&str; N_NUMERIC] =
    ["avg_monthly_spend", "days_since_payment", "tenure"];

/// Probability at or above which a customer is labelled as churning.
pub const DECISION_THRESHOLD: f64 = 0.5;

pub const GENDER_FIELD: &str = "gender";
pub const CONTRACT_TYPE_FIELD: &str = "contract_type";

/// Gender categories. `Female` is the reference (all-zero) category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "Female" => Ok(Gender::Female),
            "Male" => Ok(Gender::Male),
            other => Err(ChurnError::UnknownCategory {
                field: GENDER_FIELD,
                value: other.to_string(),
            }),
        }
    }

    /// One-hot indicators with the reference column dropped.
    pub fn indicators(self) -> [f64; 1] {
        match self {
            Gender::Female => [0.0],
            Gender::Male => [1.0],
        }
    }
}

/// Contract categories. `MonthToMonth` is the reference (all-zero) category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractType {
    MonthToMonth,
    OneYear,
    TwoYear,
}

impl ContractType {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "Month-to-month" => Ok(ContractType::MonthToMonth),
            "One year" => Ok(ContractType::OneYear),
            "Two year" => Ok(ContractType::TwoYear),
            other => Err(ChurnError::UnknownCategory {
                field: CONTRACT_TYPE_FIELD,
                value: other.to_string(),
            }),
        }
    }

    pub fn indicators(self) -> [f64; 2] {
        match self {
            ContractType::MonthToMonth => [0.0, 0.0],
            ContractType::OneYear => [1.0, 0.0],
            ContractType::TwoYear => [0.0, 1.0],
        }
    }
}

/// Feature names as owned strings, the form stored in artifacts.
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Check that an artifact was written under the compiled schema.
pub fn ensure_compatible(schema_version: &str, names: &[String]) -> Result<()> {
    if schema_version != SCHEMA_VERSION {
        return Err(ChurnError::SchemaMismatch {
            expected: SCHEMA_VERSION.to_string(),
            found: schema_version.to_string(),
        });
    }
    if names.len() != N_FEATURES || names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b) {
        return Err(ChurnError::SchemaMismatch {
            expected: FEATURE_NAMES.join(","),
            found: names.join(","),
        });
    }
    Ok(())
}
