//! Feature encoding shared by the trainer and the predictor
//!
//! A record is encoded into a fixed six-component vector laid out as
//! [`crate::schema::FEATURE_NAMES`]. Categorical fields are one-hot encoded with the
//! reference category dropped; values outside the known categories are
//! errors. Missing numeric fields are filled with means fitted at training
//! time and carried in the scaler artifact.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::{CustomerRecord, LabeledRecord};
use crate::error::{ChurnError, Result};
use crate::schema::{
    ContractType, Gender, CONTRACT_TYPE_FIELD, GENDER_FIELD, NUMERIC_FEATURES, N_FEATURES,
    N_NUMERIC,
};

/// An encoded record in schema order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; N_FEATURES]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn values(&self) -> [f64; N_FEATURES] {
        self.0
    }
}

/// Per-feature means of the numeric features, used to fill missing values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImputationMeans {
    pub avg_monthly_spend: f64,
    pub days_since_payment: f64,
    pub tenure: f64,
}

impl ImputationMeans {
    /// Fit means over the observed values of a dataset.
    ///
    /// Each feature's mean only counts rows where that feature is present.
    pub fn fit(records: &[LabeledRecord]) -> Result<Self> {
        let mut sums = [0.0; N_NUMERIC];
        let mut counts = [0usize; N_NUMERIC];

        for labeled in records {
            for (i, value) in raw_numeric(&labeled.record).into_iter().enumerate() {
                if let Some(value) = value {
                    sums[i] += value;
                    counts[i] += 1;
                }
            }
        }

        let mut means = [0.0; N_NUMERIC];
        for i in 0..N_NUMERIC {
            if counts[i] == 0 {
                return Err(ChurnError::NoObservedValues {
                    feature: NUMERIC_FEATURES[i],
                });
            }
            means[i] = sums[i] / counts[i] as f64;
        }

        Ok(Self::from_array(means))
    }

    pub fn from_array(means: [f64; N_NUMERIC]) -> Self {
        Self {
            avg_monthly_spend: means[0],
            days_since_payment: means[1],
            tenure: means[2],
        }
    }

    pub fn as_array(&self) -> [f64; N_NUMERIC] {
        [self.avg_monthly_spend, self.days_since_payment, self.tenure]
    }
}

/// Encodes customer records with a fixed set of imputation means.
#[derive(Debug, Clone, Copy)]
pub struct FeatureEncoder {
    means: ImputationMeans,
}

impl FeatureEncoder {
    pub fn new(means: ImputationMeans) -> Self {
        Self { means }
    }

    pub fn means(&self) -> &ImputationMeans {
        &self.means
    }

    /// Encode one record.
    ///
    /// # Errors
    /// * `MissingCategory` if gender or contract type is absent
    /// * `UnknownCategory` if either holds a value outside the known set
    /// * `InvalidNumeric` for a negative or non-finite numeric value
    pub fn encode(&self, record: &CustomerRecord) -> Result<FeatureVector> {
        let gender = Gender::parse(required(&record.gender, GENDER_FIELD)?)?;
        let contract = ContractType::parse(required(&record.contract_type, CONTRACT_TYPE_FIELD)?)?;

        let fill = self.means.as_array();
        let mut values = [0.0; N_FEATURES];
        for (i, raw) in raw_numeric(record).into_iter().enumerate() {
            let value = raw.unwrap_or(fill[i]);
            if !value.is_finite() || value < 0.0 {
                return Err(ChurnError::InvalidNumeric {
                    field: NUMERIC_FEATURES[i],
                    value,
                });
            }
            values[i] = value;
        }

        let [male] = gender.indicators();
        let [one_year, two_year] = contract.indicators();
        values[N_NUMERIC] = male;
        values[N_NUMERIC + 1] = one_year;
        values[N_NUMERIC + 2] = two_year;

        Ok(FeatureVector(values))
    }

    /// Encode a batch of records into an `(n, 6)` matrix, stopping at the first error.
    pub fn encode_all<'a, I>(&self, records: I) -> Result<Array2<f64>>
    where
        I: IntoIterator<Item = &'a CustomerRecord>,
    {
        let vectors = records
            .into_iter()
            .map(|record| self.encode(record))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array2::from_shape_fn((vectors.len(), N_FEATURES), |(i, j)| {
            vectors[i].0[j]
        }))
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or(ChurnError::MissingCategory { field })
}

fn raw_numeric(record: &CustomerRecord) -> [Option<f64>; N_NUMERIC] {
    [
        record.avg_monthly_spend,
        record.days_since_payment.map(f64::from),
        record.tenure.map(f64::from),
    ]
}
