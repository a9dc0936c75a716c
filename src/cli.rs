//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::{
    TrainConfig, DEFAULT_EVAL_FRACTION, DEFAULT_L2_PENALTY, DEFAULT_LEARNING_RATE,
    DEFAULT_MAX_EPOCHS, DEFAULT_SEED, DEFAULT_TOLERANCE,
};
use crate::data::CustomerRecord;

/// Customer churn prediction: train, score and report
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding versioned model artifacts
    #[arg(short, long, global = true, default_value = "ml/artifacts")]
    pub artifacts: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train a model from a labeled CSV and make it the current run
    Train {
        /// Path to the input CSV file
        #[arg(short, long, default_value = "data/churn_features.csv")]
        input: PathBuf,

        #[command(flatten)]
        hyper: TrainArgs,
    },

    /// Score a single customer with the current run
    Predict(PredictArgs),

    /// Score every customer in a CSV and render charts
    Report {
        /// Path to the input CSV file
        #[arg(short, long, default_value = "data/churn_features.csv")]
        input: PathBuf,

        /// Output path for the probability histogram
        #[arg(short, long, default_value = "churn_report.png")]
        output: PathBuf,
    },

    /// Run sync, transform and train stages in sequence
    Pipeline {
        /// Path to the transformed training CSV
        #[arg(short, long, default_value = "data/churn_features.csv")]
        input: PathBuf,

        /// Command that syncs raw data, e.g. "airbyte-sync --connection churn"
        #[arg(long)]
        sync_command: Option<String>,

        /// Command that builds the feature table, e.g. "dbt run"
        #[arg(long)]
        transform_command: Option<String>,

        #[command(flatten)]
        hyper: TrainArgs,
    },
}

/// Training hyperparameters
#[derive(ClapArgs, Debug, Clone)]
pub struct TrainArgs {
    /// Seed for the train/evaluation split
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Share of rows held out for evaluation
    #[arg(long, default_value_t = DEFAULT_EVAL_FRACTION)]
    pub eval_fraction: f64,

    #[arg(long, default_value_t = DEFAULT_LEARNING_RATE)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = DEFAULT_MAX_EPOCHS)]
    pub max_epochs: usize,

    #[arg(long, default_value_t = DEFAULT_L2_PENALTY)]
    pub l2_penalty: f64,

    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,
}

impl TrainArgs {
    pub fn to_config(&self) -> TrainConfig {
        TrainConfig {
            seed: self.seed,
            eval_fraction: self.eval_fraction,
            learning_rate: self.learning_rate,
            max_epochs: self.max_epochs,
            l2_penalty: self.l2_penalty,
            tolerance: self.tolerance,
        }
    }
}

/// Customer fields for prediction; omitted numerics fall back to training means
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PredictArgs {
    /// Full record as JSON; overrides the individual field flags
    #[arg(long)]
    pub json: Option<String>,

    #[arg(long)]
    pub customer_id: Option<String>,

    /// Male or Female
    #[arg(long)]
    pub gender: Option<String>,

    /// Month-to-month, One year or Two year
    #[arg(long)]
    pub contract_type: Option<String>,

    /// Average monthly spend
    #[arg(long)]
    pub monthly_spend: Option<f64>,

    /// Days since last payment
    #[arg(long)]
    pub days_since_payment: Option<u32>,

    /// Customer tenure in months
    #[arg(long)]
    pub tenure: Option<u32>,
}

impl PredictArgs {
    /// Build the record to score
    pub fn to_record(&self) -> anyhow::Result<CustomerRecord> {
        if let Some(ref raw) = self.json {
            let record = serde_json::from_str(raw)
                .map_err(|err| anyhow::anyhow!("Invalid customer JSON: {}", err))?;
            return Ok(record);
        }

        if let Some(spend) = self.monthly_spend {
            if !spend.is_finite() || spend < 0.0 {
                anyhow::bail!("Monthly spend must be a non-negative number, got {}", spend);
            }
        }

        Ok(CustomerRecord {
            customer_id: self.customer_id.clone(),
            gender: self.gender.clone(),
            contract_type: self.contract_type.clone(),
            avg_monthly_spend: self.monthly_spend,
            days_since_payment: self.days_since_payment,
            tenure: self.tenure,
            last_payment_date: None,
        })
    }
}

/// Split a stage command line on whitespace
pub fn split_command(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_ref()
        .map(|line| line.split_whitespace().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict_flags() {
        let args = Args::try_parse_from([
            "churnforge",
            "predict",
            "--gender",
            "Male",
            "--contract-type",
            "One year",
            "--monthly-spend",
            "50.0",
            "--tenure",
            "12",
        ])
        .unwrap();

        let Command::Predict(predict) = args.command else {
            panic!("expected predict subcommand");
        };
        let record = predict.to_record().unwrap();
        assert_eq!(record.gender.as_deref(), Some("Male"));
        assert_eq!(record.contract_type.as_deref(), Some("One year"));
        assert_eq!(record.avg_monthly_spend, Some(50.0));
        assert_eq!(record.tenure, Some(12));
        assert_eq!(record.days_since_payment, None);
        assert_eq!(args.artifacts, PathBuf::from("ml/artifacts"));
    }

    #[test]
    fn test_predict_json_record() {
        let predict = PredictArgs {
            json: Some(r#"{"gender":"Female","contract_type":"Two year","tenure":30}"#.to_string()),
            ..Default::default()
        };
        let record = predict.to_record().unwrap();
        assert_eq!(record.tenure, Some(30));

        let predict = PredictArgs {
            json: Some("not json".to_string()),
            ..Default::default()
        };
        assert!(predict.to_record().is_err());
    }

    #[test]
    fn test_negative_spend_rejected() {
        let predict = PredictArgs {
            monthly_spend: Some(-5.0),
            ..Default::default()
        };
        assert!(predict.to_record().is_err());
    }

    #[test]
    fn test_train_defaults() {
        let args = Args::try_parse_from(["churnforge", "train", "--verbose"]).unwrap();
        assert!(args.verbose);
        let Command::Train { input, hyper } = args.command else {
            panic!("expected train subcommand");
        };
        assert_eq!(input, PathBuf::from("data/churn_features.csv"));
        assert_eq!(hyper.to_config(), TrainConfig::default());
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command(&Some("dbt run --select churn".to_string())),
            Some(vec!["dbt".to_string(), "run".to_string(), "--select".to_string(), "churn".to_string()])
        );
        assert_eq!(split_command(&None), None);
    }
}
