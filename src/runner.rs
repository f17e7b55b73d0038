//! Training Runner - one end-to-end train/evaluate/track pass
//!
//! ```text
//! RunConfig ──> load train/test ──> fit ──> predict ──> evaluate
//!                                                          │
//!                           TrackingSession (opened here) <┘
//!                             ├── params alpha, l1_ratio
//!                             ├── metrics rmse, mae, r2
//!                             ├── file scheme:  <model_dir>/model.json
//!                             │                 + copy under the artifact path
//!                             └── other scheme: upload + register
//! ```
//!
//! Everything up to evaluation runs before the tracking session exists, so a
//! bad dataset or solver failure never leaves a run behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RunConfig;
use crate::dataset::load_train_test;
use crate::metrics::{EvaluationResult, MetricsEvaluator, RegressionEvaluator};
use crate::model::{ElasticNetFitter, Fittable, Hyperparameters, TrainedModel, MODEL_FILE_NAME};
use crate::report;
use crate::tracking::{open_store, StorageScheme, TrackingSession, TrackingStore};
use crate::Result;

/// Artifact sub-directory the model is logged under.
pub const MODEL_ARTIFACT_DIR: &str = "model";

/// Where the fitted model ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelLocation {
    /// Written to the local model directory (file-scheme tracking).
    Local {
        /// Path of the serialized model
        path: PathBuf,
        /// Copy written under the run's local artifact path
        artifact_uri: String,
    },
    /// Uploaded and registered with the tracking server's registry.
    Registered {
        /// Registered model name
        name: String,
        /// Version assigned by the registry
        version: String,
        /// Artifact URI the version points at
        source: String,
    },
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    experiment_id: String,
    run_id: String,
    hyperparameters: Hyperparameters,
    evaluation: EvaluationResult,
    model_location: ModelLocation,
}

impl RunRecord {
    /// Tracking experiment the run was filed under.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Tracking run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Hyperparameters the model was fitted with.
    #[must_use]
    pub const fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Test-set metrics.
    #[must_use]
    pub const fn evaluation(&self) -> &EvaluationResult {
        &self.evaluation
    }

    /// Where the model was stored.
    #[must_use]
    pub const fn model_location(&self) -> &ModelLocation {
        &self.model_location
    }
}

/// Executes the train/evaluate/track pipeline.
///
/// ```rust,no_run
/// use train_eval::runner::TrainingRunner;
///
/// let record = TrainingRunner::new().execute("params.yaml")?;
/// println!("rmse = {}", record.evaluation().rmse);
/// # Ok::<(), train_eval::Error>(())
/// ```
pub struct TrainingRunner<F = ElasticNetFitter, M = RegressionEvaluator> {
    fitter: F,
    evaluator: M,
    store: Option<Box<dyn TrackingStore>>,
}

impl TrainingRunner {
    /// Runner with the ElasticNet fitter and standard regression metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::with_components(ElasticNetFitter::default(), RegressionEvaluator)
    }
}

impl Default for TrainingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Fittable, M: MetricsEvaluator> TrainingRunner<F, M> {
    /// Runner with caller-supplied fitting and evaluation.
    #[must_use]
    pub const fn with_components(fitter: F, evaluator: M) -> Self {
        Self {
            fitter,
            evaluator,
            store: None,
        }
    }

    /// Use `store` instead of resolving one from the tracking URI.
    #[must_use]
    pub fn with_store<S: TrackingStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Load the configuration at `config_path` and run.
    ///
    /// # Errors
    ///
    /// See [`TrainingRunner::execute_with_config`]; additionally
    /// [`crate::Error::Config`] if the file is unreadable or invalid.
    pub fn execute(&self, config_path: impl AsRef<Path>) -> Result<RunRecord> {
        let config_path = config_path.as_ref();
        info!(config = %config_path.display(), "loading configuration");
        let config = RunConfig::from_path(config_path)?;
        self.execute_with_config(&config)
    }

    /// Run the pipeline for an already-resolved configuration.
    ///
    /// # Errors
    ///
    /// * [`crate::Error::Config`] if `config` fails validation
    /// * [`crate::Error::DataLoad`] / [`crate::Error::Schema`] for dataset problems
    /// * [`crate::Error::Fit`] if the solver rejects the data
    /// * [`crate::Error::TrackingUnavailable`] / [`crate::Error::Tracking`] for store failures
    /// * [`crate::Error::Io`] if the model or a report cannot be written
    pub fn execute_with_config(&self, config: &RunConfig) -> Result<RunRecord> {
        config.validate()?;
        let hyperparameters = config.hyperparameters;

        let (train, test) =
            load_train_test(&config.train_path, &config.test_path, &config.target_col)?;
        info!(
            train_rows = train.n_samples(),
            test_rows = test.n_samples(),
            features = train.feature_names().len(),
            "datasets loaded"
        );

        let model = self
            .fitter
            .fit(&hyperparameters, config.random_state, &train)?;
        let predicted = model.predict(test.features())?;
        let evaluation = self.evaluator.evaluate(predicted.view(), test.target())?;
        info!(
            alpha = hyperparameters.alpha,
            l1_ratio = hyperparameters.l1_ratio,
            rmse = evaluation.rmse,
            mae = evaluation.mae,
            r2 = evaluation.r2,
            "model evaluated"
        );

        let opened: Box<dyn TrackingStore>;
        let store: &dyn TrackingStore = if let Some(store) = &self.store {
            store.as_ref()
        } else {
            opened = open_store(&config.tracking)?;
            opened.as_ref()
        };

        let session = TrackingSession::start(
            store,
            &config.tracking.experiment_name,
            &config.tracking.run_name,
        )?;
        info!(
            experiment = session.experiment().name(),
            experiment_id = session.experiment().experiment_id(),
            run_id = session.run().run_id(),
            "tracking run started"
        );
        session.log_param("alpha", hyperparameters.alpha)?;
        session.log_param("l1_ratio", hyperparameters.l1_ratio)?;
        for (key, value) in evaluation.as_pairs() {
            session.log_metric(key, value)?;
        }

        let model_location = match session.storage_scheme() {
            StorageScheme::Local => persist_locally(&session, &model, &config.model_dir)?,
            StorageScheme::Remote(scheme) => {
                info!(scheme = %scheme, "artifact store is remote, registering model");
                register_remotely(&session, &model, &config.tracking.registered_model_name)?
            }
        };

        report::write_reports(&config.reports, &hyperparameters, &evaluation)?;

        let run = session.finish()?;
        info!(run_id = run.run_id(), experiment_id = run.experiment_id(), "run finished");

        Ok(RunRecord {
            experiment_id: run.experiment_id().to_string(),
            run_id: run.run_id().to_string(),
            hyperparameters,
            evaluation,
            model_location,
        })
    }
}

fn model_artifact_path() -> String {
    format!("{MODEL_ARTIFACT_DIR}/{MODEL_FILE_NAME}")
}

fn persist_locally(
    session: &TrackingSession<'_>,
    model: &TrainedModel,
    model_dir: &Path,
) -> Result<ModelLocation> {
    let bytes = model.to_json_bytes()?;
    fs::create_dir_all(model_dir)?;
    let path = model_dir.join(MODEL_FILE_NAME);
    fs::write(&path, &bytes)?;
    // written in place, never uploaded through the store
    let artifact = session.write_local_artifact(&model_artifact_path(), &bytes)?;
    info!(path = %path.display(), artifact_uri = artifact.uri(), "model saved locally");

    Ok(ModelLocation::Local {
        path,
        artifact_uri: artifact.uri().to_string(),
    })
}

fn register_remotely(
    session: &TrackingSession<'_>,
    model: &TrainedModel,
    registered_model_name: &str,
) -> Result<ModelLocation> {
    let bytes = model.to_json_bytes()?;
    session.log_artifact(&model_artifact_path(), &bytes)?;
    let source = format!(
        "{}/{MODEL_ARTIFACT_DIR}",
        session.run().artifact_uri().trim_end_matches('/')
    );
    let version = session.register_model(registered_model_name, &source)?;
    info!(name = version.name(), version = version.version(), "model registered");

    Ok(ModelLocation::Registered {
        name: version.name().to_string(),
        version: version.version().to_string(),
        source: version.source().to_string(),
    })
}
