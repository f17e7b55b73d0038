//! Run configuration resolved from a `params.yaml` style document
//!
//! The document nests settings by stage (`base`, `split_data`, `estimators`,
//! `mlflow_config`, ...). Keys this crate does not use are ignored, so the same
//! file can drive the data-splitting stage that produced the CSVs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Hyperparameters;
use crate::{Error, Result};

/// Default deadline for a single tracking request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct RawConfig {
    base: RawBase,
    split_data: RawSplitData,
    estimators: RawEstimators,
    model_dir: PathBuf,
    #[serde(default)]
    reports: Option<RawReports>,
    mlflow_config: RawTrackingConfig,
}

#[derive(Debug, Deserialize)]
struct RawBase {
    random_state: u64,
    target_col: String,
}

#[derive(Debug, Deserialize)]
struct RawSplitData {
    train_path: PathBuf,
    test_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawEstimators {
    #[serde(rename = "ElasticNet")]
    elastic_net: RawEstimator,
}

#[derive(Debug, Deserialize)]
struct RawEstimator {
    params: RawElasticNetParams,
}

#[derive(Debug, Deserialize)]
struct RawElasticNetParams {
    alpha: f64,
    l1_ratio: f64,
}

#[derive(Debug, Deserialize)]
struct RawReports {
    params: Option<PathBuf>,
    scores: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawTrackingConfig {
    remote_server_uri: Option<String>,
    experiment_name: String,
    run_name: String,
    registered_model_name: String,
    request_timeout_secs: Option<u64>,
}

/// Tracking endpoint and naming for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingConfig {
    /// Tracking URI (`http(s)://...`, `file:...`, a bare path, or empty for `./mlruns`)
    pub uri: String,
    /// Experiment the run is filed under (created if absent)
    pub experiment_name: String,
    /// Human-readable run name
    pub run_name: String,
    /// Registry name used when the model is stored remotely
    pub registered_model_name: String,
    /// Deadline applied to each network call
    pub request_timeout: Duration,
}

/// Optional JSON report destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportPaths {
    /// Where `{"alpha", "l1_ratio"}` is written
    pub params: Option<PathBuf>,
    /// Where `{"rmse", "mae", "r2"}` is written
    pub scores: Option<PathBuf>,
}

/// Immutable settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    /// Training split CSV
    pub train_path: PathBuf,
    /// Test split CSV
    pub test_path: PathBuf,
    /// Regression target column
    pub target_col: String,
    /// Seed handed to the fitting capability
    pub random_state: u64,
    /// ElasticNet hyperparameters
    pub hyperparameters: Hyperparameters,
    /// Directory receiving the model file in local storage mode
    pub model_dir: PathBuf,
    /// Optional score/param reports
    pub reports: ReportPaths,
    /// Tracking settings
    pub tracking: TrackingConfig,
}

impl RunConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, is not valid YAML,
    /// lacks a required field, or holds an out-of-range value.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&contents)
            .map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
                other => other,
            })
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed YAML, missing fields or invalid values.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig =
            serde_yaml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;

        let config = Self {
            train_path: raw.split_data.train_path,
            test_path: raw.split_data.test_path,
            target_col: raw.base.target_col,
            random_state: raw.base.random_state,
            hyperparameters: Hyperparameters {
                alpha: raw.estimators.elastic_net.params.alpha,
                l1_ratio: raw.estimators.elastic_net.params.l1_ratio,
            },
            model_dir: raw.model_dir,
            reports: raw
                .reports
                .map(|r| ReportPaths {
                    params: r.params,
                    scores: r.scores,
                })
                .unwrap_or_default(),
            tracking: TrackingConfig {
                uri: raw.mlflow_config.remote_server_uri.unwrap_or_default(),
                experiment_name: raw.mlflow_config.experiment_name,
                run_name: raw.mlflow_config.run_name,
                registered_model_name: raw.mlflow_config.registered_model_name,
                request_timeout: Duration::from_secs(
                    raw.mlflow_config
                        .request_timeout_secs
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
                ),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and non-empty names, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing all violations.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.train_path.as_os_str().is_empty() {
            errors.push("split_data.train_path must not be empty".to_string());
        }
        if self.test_path.as_os_str().is_empty() {
            errors.push("split_data.test_path must not be empty".to_string());
        }
        if self.target_col.trim().is_empty() {
            errors.push("base.target_col must not be empty".to_string());
        }
        if let Err(msg) = self.hyperparameters.check() {
            errors.push(format!("estimators.ElasticNet.params: {msg}"));
        }
        if self.model_dir.as_os_str().is_empty() {
            errors.push("model_dir must not be empty".to_string());
        }
        for (key, value) in [
            ("mlflow_config.experiment_name", &self.tracking.experiment_name),
            ("mlflow_config.run_name", &self.tracking.run_name),
            (
                "mlflow_config.registered_model_name",
                &self.tracking.registered_model_name,
            ),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{key} must not be empty"));
            }
        }
        if self.tracking.request_timeout.is_zero() {
            errors.push("mlflow_config.request_timeout_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ")))
        }
    }
}
