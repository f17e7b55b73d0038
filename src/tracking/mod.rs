//! Experiment tracking: records, stores and the per-run session
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunInfo (N)
//!                              │
//!                              ├──< ParamRecord (N)
//!                              ├──< MetricRecord (N)
//!                              ├──< ArtifactRecord (N) [sha256 CAS]
//!                              └──< ModelVersionRecord (0..1 per run)
//! ```
//!
//! A [`TrackingStore`] persists the schema. [`open_store`] picks an
//! implementation from the tracking URI; [`TrackingSession`] scopes one run
//! and finalises it on every exit path.
//!
//! ## Usage
//!
//! ```rust
//! use train_eval::tracking::{MemoryStore, TrackingSession, RunStatus};
//!
//! let store = MemoryStore::new();
//! let session = TrackingSession::start(&store, "my-experiment", "run-a")?;
//! session.log_param("alpha", 0.5)?;
//! session.log_metric("rmse", 0.12)?;
//! let run = session.finish()?;
//! assert_eq!(run.status(), RunStatus::Success);
//! # Ok::<(), train_eval::Error>(())
//! ```

mod artifact_record;
mod experiment_record;
mod file_store;
mod memory_store;
mod metric_record;
mod rest_store;
mod run_info;
mod session;

pub use artifact_record::{content_hash, ArtifactRecord, ModelVersionRecord};
pub use experiment_record::ExperimentRecord;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use metric_record::{MetricRecord, ParamRecord, ParamValue};
pub use rest_store::RestStore;
pub use run_info::{RunInfo, RunInfoBuilder, RunStatus};
pub use session::TrackingSession;

use reqwest::Url;

use crate::config::TrackingConfig;
use crate::{Error, Result};

/// Directory used when no tracking URI is configured.
pub const DEFAULT_FILE_STORE_ROOT: &str = "mlruns";

/// Persistence backend for tracking data.
///
/// Methods take `&self`; stores that keep state in memory use interior
/// mutability so a session can borrow the store for its whole lifetime.
pub trait TrackingStore {
    /// URI this store was opened with.
    fn tracking_uri(&self) -> &str;

    /// Look up an experiment by name, creating it if absent.
    ///
    /// # Errors
    ///
    /// Store-specific IO/network failures.
    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord>;

    /// Create a run in `Running` state.
    ///
    /// # Errors
    ///
    /// Store-specific IO/network failures.
    fn create_run(&self, experiment: &ExperimentRecord, run_name: &str) -> Result<RunInfo>;

    /// Record a hyperparameter.
    ///
    /// # Errors
    ///
    /// Store-specific IO/network failures.
    fn log_param(&self, param: &ParamRecord) -> Result<()>;

    /// Record a metric value.
    ///
    /// # Errors
    ///
    /// Store-specific IO/network failures.
    fn log_metric(&self, metric: &MetricRecord) -> Result<()>;

    /// Store `bytes` at `path` relative to the run's artifact root.
    ///
    /// # Errors
    ///
    /// Store-specific IO/network failures, or an artifact scheme the store cannot write.
    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: &[u8]) -> Result<ArtifactRecord>;

    /// Register the model at `source` under `name` in the model registry.
    ///
    /// # Errors
    ///
    /// [`Error::Tracking`] if the store has no registry, plus IO/network failures.
    fn register_model(&self, run: &RunInfo, name: &str, source: &str)
        -> Result<ModelVersionRecord>;

    /// Persist the run's status and end time.
    ///
    /// # Errors
    ///
    /// Store-specific IO/network failures.
    fn update_run(&self, run: &RunInfo) -> Result<()>;
}

/// Where a run's artifacts physically live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageScheme {
    /// `file:` artifact URI on this machine
    Local,
    /// Any other scheme (`mlflow-artifacts`, `s3`, `memory`, ...)
    Remote(String),
}

impl StorageScheme {
    /// Classify an artifact URI. Only an explicit `file` scheme counts as local.
    #[must_use]
    pub fn of_uri(uri: &str) -> Self {
        match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => Self::Local,
            Ok(url) => Self::Remote(url.scheme().to_string()),
            Err(_) => Self::Remote(String::new()),
        }
    }

    /// Whether the model should be persisted locally instead of registered.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Open the store a tracking URI points at.
///
/// * empty → file store under [`DEFAULT_FILE_STORE_ROOT`]
/// * `file:` URI or bare path → file store there
/// * `http`/`https` → MLflow REST store
///
/// # Errors
///
/// [`Error::Config`] for unsupported schemes, [`Error::Io`] if a file store
/// root cannot be created, and [`Error::Tracking`] if the HTTP client cannot
/// be built.
pub fn open_store(config: &TrackingConfig) -> Result<Box<dyn TrackingStore>> {
    let uri = config.uri.trim();
    if uri.is_empty() {
        return Ok(Box::new(FileStore::open(DEFAULT_FILE_STORE_ROOT)?));
    }

    match Url::parse(uri) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Box::new(RestStore::new(uri, config.request_timeout)?)),
            "file" => {
                let root = url
                    .to_file_path()
                    .map_err(|()| Error::Config(format!("invalid file tracking URI `{uri}`")))?;
                Ok(Box::new(FileStore::open(root)?))
            }
            other => Err(Error::Config(format!(
                "unsupported tracking URI scheme `{other}` in `{uri}`"
            ))),
        },
        // relative or absolute filesystem path
        Err(_) => Ok(Box::new(FileStore::open(uri)?)),
    }
}
