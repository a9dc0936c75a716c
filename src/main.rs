//! ChurnForge: train, score and report on customer churn
//!
//! This is the main entrypoint that wires the CLI to training, prediction,
//! reporting and the staged pipeline.

use anyhow::Result;
use clap::Parser;
use churnforge::cli::{split_command, Command, PredictArgs};
use churnforge::pipeline::{run_stages, ExternalStage, TrainStage};
use churnforge::{load_records, train, Args, ArtifactStore, ChurnError, Predictor, TrainConfig};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    let store = ArtifactStore::new(&args.artifacts);

    match &args.command {
        Command::Train { input, hyper } => run_training(input, &store, &hyper.to_config()),
        Command::Predict(predict) => run_prediction(predict, &store),
        Command::Report { input, output } => run_report(input, output, &store),
        Command::Pipeline {
            input,
            sync_command,
            transform_command,
            hyper,
        } => {
            let sync = ExternalStage::new("sync_raw_data", split_command(sync_command));
            let transform = ExternalStage::new("transform_data", split_command(transform_command));
            let train = TrainStage {
                dataset: input.clone(),
                store,
                config: hyper.to_config(),
            };

            let report = run_stages(&[&sync, &transform, &train]);
            if let Some(failed) = report.failure() {
                anyhow::bail!("Pipeline failed at stage '{}'", failed.name);
            }
            println!("✓ Pipeline complete ({} stages)", report.outcomes.len());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Train and persist a new run. A missing dataset is reported, not fatal.
fn run_training(input: &Path, store: &ArtifactStore, cfg: &TrainConfig) -> Result<()> {
    let start_time = Instant::now();

    match train(input, store, cfg) {
        Ok(pair) => {
            let model = pair.model();
            println!("✓ Model and scaler trained and saved");
            println!("  Run version: {}", pair.version());
            println!("  Artifacts: {}", store.run_dir(pair.version()).display());
            println!(
                "  Training rows: {}, evaluation rows: {}",
                model.train_rows, model.eval_rows
            );
            if let Some(metrics) = &model.metrics {
                println!(
                    "  Hold-out accuracy: {:.3} (precision {:.3}, recall {:.3})",
                    metrics.accuracy, metrics.precision, metrics.recall
                );
            }
            println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
            Ok(())
        }
        Err(err @ ChurnError::DataSourceNotFound { .. }) => {
            error!(error = %err, "training skipped, please ensure the feature data is generated");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_prediction(predict: &PredictArgs, store: &ArtifactStore) -> Result<()> {
    let record = predict.to_record()?;

    let predictor = match Predictor::load(store) {
        Ok(predictor) => predictor,
        Err(err) if err.is_model_unavailable() => {
            error!(error = %err, "model unavailable, run `churnforge train` first");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let prediction = predictor.predict(&record)?;
    info!(version = %predictor.version(), "prediction served");

    println!("=== Prediction Result ===");
    if prediction.label {
        println!(
            "This customer is likely to churn with a probability of {:.2}",
            prediction.probability
        );
    } else {
        println!(
            "This customer is unlikely to churn with a probability of {:.2}",
            prediction.probability
        );
    }
    println!("Raw churn probability: {:.4}", prediction.probability);
    println!("{}", serde_json::to_string(&prediction)?);

    Ok(())
}

fn run_report(input: &Path, output: &Path, store: &ArtifactStore) -> Result<()> {
    let predictor = Predictor::load(store)?;
    let records = load_records(input)?;

    let (summary, histogram, importance) =
        churnforge::generate_report(&predictor, &records, output)?;

    println!("\n✓ Report generated for {} customers", summary.probabilities.len());
    println!("Probability histogram saved to: {}", histogram.display());
    println!("Feature importance saved to: {}", importance.display());
    Ok(())
}
