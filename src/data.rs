//! Customer records and CSV loading using Polars

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ChurnError, Result};

pub const CUSTOMER_ID_COLUMN: &str = "customer_id";
pub const GENDER_COLUMN: &str = "gender";
pub const CONTRACT_TYPE_COLUMN: &str = "contract_type";
pub const AVG_MONTHLY_SPEND_COLUMN: &str = "avg_monthly_spend";
pub const DAYS_SINCE_PAYMENT_COLUMN: &str = "days_since_payment";
pub const TENURE_COLUMN: &str = "tenure";
pub const LAST_PAYMENT_DATE_COLUMN: &str = "last_payment_date";
pub const CHURN_LABEL_COLUMN: &str = "churn_label";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A raw customer record. Every field is optional because records arriving
/// from a form or a partially populated extract may be incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerRecord {
    /// Opaque identifier, never encoded
    pub customer_id: Option<String>,
    pub gender: Option<String>,
    pub contract_type: Option<String>,
    pub avg_monthly_spend: Option<f64>,
    pub days_since_payment: Option<u32>,
    /// Tenure in months
    pub tenure: Option<u32>,
    /// Kept for reference, never encoded
    pub last_payment_date: Option<NaiveDate>,
}

/// A customer record with its observed churn outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub record: CustomerRecord,
    pub churn: bool,
}

impl LabeledRecord {
    pub fn new(record: CustomerRecord, churn: bool) -> Self {
        Self { record, churn }
    }
}

/// Load a labeled training dataset.
///
/// The `churn_label` column must exist and be populated on every row; every
/// other column may be absent or sparse.
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * One `LabeledRecord` per data row, in file order
pub fn load_dataset(file_path: impl AsRef<Path>) -> Result<Vec<LabeledRecord>> {
    let path = file_path.as_ref();
    let df = read_frame(path)?;

    let labels = label_column(&df)
        .map_err(|source| data_source_error(path, source))?
        .ok_or_else(|| ChurnError::MissingColumn {
            column: CHURN_LABEL_COLUMN.to_string(),
        })?;
    let records = records_from_frame(path, &df)?;

    let dataset = records
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(row, (record, label))| {
            label
                .map(|churn| LabeledRecord::new(record, churn))
                .ok_or(ChurnError::MissingLabel { row })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(path = %path.display(), rows = dataset.len(), "loaded labeled dataset");
    Ok(dataset)
}

/// Load customer records, ignoring any label column.
pub fn load_records(file_path: impl AsRef<Path>) -> Result<Vec<CustomerRecord>> {
    let path = file_path.as_ref();
    let df = read_frame(path)?;
    let records = records_from_frame(path, &df)?;
    info!(path = %path.display(), rows = records.len(), "loaded customer records");
    Ok(records)
}

fn read_frame(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(ChurnError::DataSourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .finish()
        .and_then(|frame| frame.collect())
        .map_err(|source| data_source_error(path, source))?;

    debug!(path = %path.display(), shape = ?df.shape(), "read csv frame");
    Ok(df)
}

fn data_source_error(path: &Path, source: PolarsError) -> ChurnError {
    ChurnError::DataSource {
        path: path.to_path_buf(),
        source,
    }
}

/// Convert every row of the frame into a `CustomerRecord`
fn records_from_frame(path: &Path, df: &DataFrame) -> Result<Vec<CustomerRecord>> {
    let n_rows = df.height();
    let polars_err = |source| data_source_error(path, source);

    let ids = text_column(df, CUSTOMER_ID_COLUMN).map_err(polars_err)?;
    let genders = text_column(df, GENDER_COLUMN).map_err(polars_err)?;
    let contracts = text_column(df, CONTRACT_TYPE_COLUMN).map_err(polars_err)?;
    let spends = float_column(path, df, AVG_MONTHLY_SPEND_COLUMN)?;
    let days = float_column(path, df, DAYS_SINCE_PAYMENT_COLUMN)?;
    let tenures = float_column(path, df, TENURE_COLUMN)?;
    let dates = text_column(df, LAST_PAYMENT_DATE_COLUMN).map_err(polars_err)?;

    let mut records = Vec::with_capacity(n_rows);
    for row in 0..n_rows {
        let record = CustomerRecord {
            customer_id: cell(&ids, row),
            gender: cell(&genders, row),
            contract_type: cell(&contracts, row),
            avg_monthly_spend: cell(&spends, row),
            days_since_payment: cell(&days, row)
                .map(|value| whole_number(DAYS_SINCE_PAYMENT_COLUMN, value))
                .transpose()?,
            tenure: cell(&tenures, row)
                .map(|value| whole_number(TENURE_COLUMN, value))
                .transpose()?,
            last_payment_date: cell(&dates, row)
                .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()),
        };
        records.push(record);
    }

    Ok(records)
}

fn cell<T: Clone>(column: &Option<Vec<Option<T>>>, row: usize) -> Option<T> {
    column
        .as_ref()
        .and_then(|values| values.get(row).cloned().flatten())
}

/// Convert a CSV number into a non-negative whole count
fn whole_number(field: &'static str, value: f64) -> Result<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(ChurnError::InvalidNumeric { field, value })
    }
}

fn text_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<String>>>> {
    let Ok(series) = df.column(name) else {
        return Ok(None);
    };
    let as_text = series.cast(&DataType::String)?;
    let values = as_text
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
        .collect();
    Ok(Some(values))
}

/// Numeric column as floats. A non-empty cell that does not parse is an error,
/// never a missing value.
fn float_column(
    path: &Path,
    df: &DataFrame,
    name: &'static str,
) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(series) = df.column(name) else {
        return Ok(None);
    };
    let polars_err = |source| data_source_error(path, source);

    let as_float = series.cast(&DataType::Float64).map_err(polars_err)?;
    let values: Vec<Option<f64>> = as_float.f64().map_err(polars_err)?.into_iter().collect();
    if as_float.null_count() == series.null_count() {
        return Ok(Some(values));
    }

    let as_text = series.cast(&DataType::String).map_err(polars_err)?;
    let raw = as_text.str().map_err(polars_err)?;
    for (row, (value, raw)) in values.iter().zip(raw.into_iter()).enumerate() {
        match (value, raw.map(str::trim)) {
            (None, Some(raw)) if !raw.is_empty() => {
                return Err(ChurnError::MalformedNumeric {
                    column: name,
                    row,
                    value: raw.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(Some(values))
}

/// Labels may be booleans, numbers (non-zero means churn) or text
fn label_column(df: &DataFrame) -> PolarsResult<Option<Vec<Option<bool>>>> {
    let Ok(series) = df.column(CHURN_LABEL_COLUMN) else {
        return Ok(None);
    };

    if series.dtype() == &DataType::String {
        let values = series.str()?.into_iter().map(|v| v.and_then(parse_label)).collect();
        return Ok(Some(values));
    }

    let as_float = series.cast(&DataType::Float64)?;
    let values = as_float
        .f64()?
        .into_iter()
        .map(|value| value.map(|v| v != 0.0))
        .collect();
    Ok(Some(values))
}

/// Parse a textual churn label
pub fn parse_label(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "churn" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "customer_id,gender,contract_type,avg_monthly_spend,days_since_payment,tenure,last_payment_date,churn_label"
        )
        .unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file
    }

    #[test]
    fn test_load_dataset() {
        let file = create_test_csv(&[
            "C001,Male,Month-to-month,70.5,12,3,2024-01-15,1",
            "C002,Female,Two year,20.0,2,48,2024-02-01,0",
        ]);

        let dataset = load_dataset(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset[0];
        assert!(first.churn);
        assert_eq!(first.record.customer_id.as_deref(), Some("C001"));
        assert_eq!(first.record.gender.as_deref(), Some("Male"));
        assert_eq!(first.record.contract_type.as_deref(), Some("Month-to-month"));
        assert_eq!(first.record.avg_monthly_spend, Some(70.5));
        assert_eq!(first.record.days_since_payment, Some(12));
        assert_eq!(first.record.tenure, Some(3));
        assert_eq!(
            first.record.last_payment_date,
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert!(!dataset[1].churn);
    }

    #[test]
    fn test_empty_cells_become_missing_values() {
        let file = create_test_csv(&[
            "C001,Male,One year,,12,3,,0",
            "C002,Female,Two year,20.0,2,48,2024-02-01,1",
        ]);

        let dataset = load_dataset(file.path()).unwrap();
        assert_eq!(dataset[0].record.avg_monthly_spend, None);
        assert_eq!(dataset[0].record.last_payment_date, None);
        assert_eq!(dataset[1].record.avg_monthly_spend, Some(20.0));
    }

    #[test]
    fn test_missing_file_is_data_source_not_found() {
        let result = load_dataset("does/not/exist.csv");
        assert!(matches!(result, Err(ChurnError::DataSourceNotFound { .. })));
    }

    #[test]
    fn test_missing_label_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,gender,tenure").unwrap();
        writeln!(file, "C001,Male,3").unwrap();

        let result = load_dataset(file.path());
        assert!(matches!(result, Err(ChurnError::MissingColumn { .. })));

        // Unlabeled records still load for scoring
        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].contract_type, None);
    }

    #[test]
    fn test_missing_label_value_reports_row() {
        let file = create_test_csv(&[
            "C001,Male,One year,10.0,12,3,2024-01-15,1",
            "C002,Female,Two year,20.0,2,48,2024-02-01,",
        ]);

        let result = load_dataset(file.path());
        assert!(matches!(result, Err(ChurnError::MissingLabel { row: 1 })));
    }

    #[test]
    fn test_non_numeric_spend_is_rejected() {
        let file = create_test_csv(&[
            "C001,Male,One year,12.5,3,4,2024-01-01,0",
            "C002,Male,One year,abc,3,4,2024-01-01,1",
        ]);

        match load_dataset(file.path()) {
            Err(ChurnError::MalformedNumeric { column, row, value }) => {
                assert_eq!(column, "avg_monthly_spend");
                assert_eq!(row, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("expected MalformedNumeric, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_tenure_is_invalid() {
        let file = create_test_csv(&["C001,Male,One year,10.0,12,3.5,2024-01-15,1"]);

        let result = load_dataset(file.path());
        assert!(matches!(
            result,
            Err(ChurnError::InvalidNumeric { field: "tenure", .. })
        ));
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("Yes"), Some(true));
        assert_eq!(parse_label(" false "), Some(false));
        assert_eq!(parse_label("maybe"), None);
    }

    #[test]
    fn test_record_deserializes_from_partial_json() {
        let record: CustomerRecord =
            serde_json::from_str(r#"{"gender":"Male","contract_type":"One year","tenure":4}"#)
                .unwrap();
        assert_eq!(record.gender.as_deref(), Some("Male"));
        assert_eq!(record.tenure, Some(4));
        assert_eq!(record.avg_monthly_spend, None);
    }
}
