//! Pipeline stages for an external orchestrator
//!
//! Each stage is a plain callable that either succeeds or returns a typed
//! error. `run_stages` runs them in order and stops at the first failure; it
//! keeps no state between runs and never retries.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn};

use crate::artifacts::ArtifactStore;
use crate::config::TrainConfig;
use crate::error::{ChurnError, Result};
use crate::model;

/// One step of the churn pipeline
pub trait Stage {
    fn name(&self) -> &str;
    fn run(&self) -> Result<()>;
}

/// A stage delegated to an external tool (raw data sync, transformations).
///
/// Without a configured command the stage logs that it is skipped and succeeds.
#[derive(Debug, Clone)]
pub struct ExternalStage {
    name: String,
    command: Option<Vec<String>>,
}

impl ExternalStage {
    pub fn new(name: impl Into<String>, command: Option<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            command: command.filter(|argv| !argv.is_empty()),
        }
    }
}

impl Stage for ExternalStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<()> {
        let Some((program, args)) = self.command.as_ref().and_then(|argv| argv.split_first())
        else {
            info!(stage = %self.name, "no command configured, skipping");
            return Ok(());
        };

        info!(stage = %self.name, program = %program, "running external command");
        let status = Command::new(program).args(args).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ChurnError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("stage '{}' exited with {}", self.name, status),
            )))
        }
    }
}

/// Train the churn model from a dataset into an artifact store
#[derive(Debug, Clone)]
pub struct TrainStage {
    pub dataset: PathBuf,
    pub store: ArtifactStore,
    pub config: TrainConfig,
}

impl Stage for TrainStage {
    fn name(&self) -> &str {
        "train_model"
    }

    fn run(&self) -> Result<()> {
        let pair = model::train(&self.dataset, &self.store, &self.config)?;
        info!(version = %pair.version(), "model stage complete");
        Ok(())
    }
}

/// Result of one stage
#[derive(Debug)]
pub struct StageOutcome {
    pub name: String,
    pub elapsed: Duration,
    pub error: Option<ChurnError>,
}

/// Results of a pipeline run, in execution order
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<StageOutcome>,
    /// Stages not run because an earlier one failed
    pub skipped: Vec<String>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.skipped.is_empty() && self.outcomes.iter().all(|outcome| outcome.error.is_none())
    }

    pub fn failure(&self) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|outcome| outcome.error.is_some())
    }
}

/// Run stages in order, stopping after the first failure.
pub fn run_stages(stages: &[&dyn Stage]) -> PipelineReport {
    let mut report = PipelineReport::default();

    for (i, stage) in stages.iter().enumerate() {
        let _span = info_span!("stage", name = stage.name()).entered();
        let start = Instant::now();
        let result = stage.run();
        let elapsed = start.elapsed();

        let failed = result.is_err();
        match &result {
            Ok(()) => info!(elapsed_ms = elapsed.as_millis() as u64, "stage succeeded"),
            Err(err) => error!(error = %err, "stage failed"),
        }
        report.outcomes.push(StageOutcome {
            name: stage.name().to_string(),
            elapsed,
            error: result.err(),
        });

        if failed {
            report.skipped = stages[i + 1..]
                .iter()
                .map(|stage| stage.name().to_string())
                .collect();
            if !report.skipped.is_empty() {
                warn!(skipped = ?report.skipped, "pipeline stopped early");
            }
            break;
        }
    }

    report
}
