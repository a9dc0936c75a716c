//! Versioned scaler/model artifacts and their on-disk store
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                    version of the live run
//! runs/<version>/scaler.json
//! runs/<version>/model.json
//! ```
//!
//! A run directory is fully written under `runs/<version>.tmp/` and renamed
//! into place before `CURRENT` is swapped (write `CURRENT.tmp`, rename), so a
//! reader resolving `CURRENT` only ever sees a complete pair from one run.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::encoder::ImputationMeans;
use crate::error::{ChurnError, Result};
use crate::model::{EvalMetrics, LogisticModel, StandardScaler};
use crate::schema::{self, N_FEATURES};

pub const CURRENT_FILE: &str = "CURRENT";
pub const RUNS_DIR: &str = "runs";
pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "model.json";
const STAGING_SUFFIX: &str = ".tmp";

/// Tag shared by the two artifacts of one training run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunVersion(String);

impl RunVersion {
    /// Timestamp plus a random suffix so runs within the same microsecond differ
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("{}-{:08x}", at.format("%Y%m%dT%H%M%S%.6fZ"), suffix))
    }

    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fitted imputation and standardization state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub version: RunVersion,
    pub schema_version: String,
    pub feature_names: Vec<String>,
    /// Means over the whole dataset, used to fill missing numeric fields
    pub impute_means: ImputationMeans,
    /// Statistics over the training partition
    pub scaler: StandardScaler,
    pub trained_at: DateTime<Utc>,
}

/// Fitted classifier state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: RunVersion,
    pub schema_version: String,
    pub feature_names: Vec<String>,
    pub classifier: LogisticModel,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub metrics: Option<EvalMetrics>,
    pub trained_at: DateTime<Utc>,
}

/// A scaler and model known to come from the same training run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPair {
    scaler: ScalerArtifact,
    model: ModelArtifact,
}

impl ArtifactPair {
    /// Pair two artifacts, rejecting version skew and schema drift.
    pub fn new(scaler: ScalerArtifact, model: ModelArtifact) -> Result<Self> {
        if scaler.version != model.version {
            return Err(ChurnError::ArtifactMismatch {
                scaler: scaler.version.to_string(),
                model: model.version.to_string(),
            });
        }

        schema::ensure_compatible(&scaler.schema_version, &scaler.feature_names)?;
        schema::ensure_compatible(&model.schema_version, &model.feature_names)?;

        let lengths = [
            scaler.scaler.mean.len(),
            scaler.scaler.scale.len(),
            model.classifier.weights.len(),
        ];
        if let Some(&found) = lengths.iter().find(|&&len| len != N_FEATURES) {
            return Err(ChurnError::SchemaMismatch {
                expected: format!("{} values per feature vector", N_FEATURES),
                found: format!("{} values", found),
            });
        }

        Ok(Self { scaler, model })
    }

    pub fn version(&self) -> &RunVersion {
        &self.scaler.version
    }

    pub fn scaler(&self) -> &ScalerArtifact {
        &self.scaler
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn into_parts(self) -> (ScalerArtifact, ModelArtifact) {
        (self.scaler, self.model)
    }
}

/// Load two artifact files and pair them.
pub fn load_pair(scaler_path: impl AsRef<Path>, model_path: impl AsRef<Path>) -> Result<ArtifactPair> {
    let scaler: ScalerArtifact = read_json(scaler_path.as_ref())?;
    let model: ModelArtifact = read_json(model_path.as_ref())?;
    ArtifactPair::new(scaler, model)
}

/// Filesystem store holding every run and a pointer to the live one
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, version: &RunVersion) -> PathBuf {
        self.root.join(RUNS_DIR).join(version.as_str())
    }

    /// Persist a pair and make it the current run.
    ///
    /// Completed runs are immutable; saving a version that already exists
    /// fails with `RunExists` and leaves the store untouched.
    ///
    /// # Returns
    /// * The run directory the pair was written to
    pub fn save(&self, pair: &ArtifactPair) -> Result<PathBuf> {
        let version = pair.version();
        let final_dir = self.run_dir(version);
        if final_dir.exists() {
            return Err(ChurnError::RunExists {
                version: version.to_string(),
            });
        }

        let runs = self.root.join(RUNS_DIR);
        fs::create_dir_all(&runs)?;

        let staging = runs.join(format!("{}{}", version, STAGING_SUFFIX));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        if let Err(err) = write_run(&staging, pair) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "failed to remove staging directory");
            }
            return Err(err);
        }

        fs::rename(&staging, &final_dir)?;
        self.set_current(version)?;

        info!(version = %version, path = %final_dir.display(), "artifacts saved");
        Ok(final_dir)
    }

    /// Version the `CURRENT` pointer names.
    pub fn current_version(&self) -> Result<RunVersion> {
        let pointer = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&pointer) {
            Ok(raw) if !raw.trim().is_empty() => Ok(RunVersion::new(raw.trim())),
            Ok(_) => Err(ChurnError::ArtifactsNotFound { path: pointer }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ChurnError::ArtifactsNotFound { path: pointer })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Load the current pair.
    pub fn load(&self) -> Result<ArtifactPair> {
        let version = self.current_version()?;
        self.load_version(&version)
    }

    /// Load a specific run.
    pub fn load_version(&self, version: &RunVersion) -> Result<ArtifactPair> {
        let dir = self.run_dir(version);
        let pair = load_pair(dir.join(SCALER_FILE), dir.join(MODEL_FILE))?;
        if pair.version() != version {
            return Err(ChurnError::ArtifactMismatch {
                scaler: pair.version().to_string(),
                model: version.to_string(),
            });
        }
        debug!(version = %version, "artifacts loaded");
        Ok(pair)
    }

    /// Completed runs in the store, oldest first.
    pub fn versions(&self) -> Result<Vec<RunVersion>> {
        let runs = self.root.join(RUNS_DIR);
        let entries = match fs::read_dir(&runs) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(STAGING_SUFFIX) {
                versions.push(RunVersion::new(name));
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn set_current(&self, version: &RunVersion) -> Result<()> {
        let tmp = self.root.join(format!("{}{}", CURRENT_FILE, STAGING_SUFFIX));
        let mut file = File::create(&tmp)?;
        file.write_all(version.as_str().as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, self.root.join(CURRENT_FILE))?;
        Ok(())
    }
}

fn write_run(dir: &Path, pair: &ArtifactPair) -> Result<()> {
    write_json(&dir.join(SCALER_FILE), pair.scaler())?;
    write_json(&dir.join(MODEL_FILE), pair.model())?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| ChurnError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    })?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ChurnError::ArtifactsNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes).map_err(|source| ChurnError::ArtifactCorrupt {
        path: path.to_path_buf(),
        source,
    })
}
