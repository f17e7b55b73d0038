//! Tracking Session - scoped handle on one tracking run

use tracing::{debug, warn};

use super::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ModelVersionRecord, ParamRecord, ParamValue,
    RunInfo, RunStatus, StorageScheme, TrackingStore,
};
use crate::Result;

/// An open run on a [`TrackingStore`].
///
/// Call [`TrackingSession::finish`] on success. A session dropped without
/// finishing (early return, `?`, panic unwinding) marks its run `Failed`.
pub struct TrackingSession<'s> {
    store: &'s dyn TrackingStore,
    experiment: ExperimentRecord,
    run: RunInfo,
    closed: bool,
}

impl<'s> TrackingSession<'s> {
    /// Resolve `experiment_name` (creating it if absent) and open a run in it.
    ///
    /// # Errors
    ///
    /// Whatever the store reports for the lookup or run creation.
    pub fn start(
        store: &'s dyn TrackingStore,
        experiment_name: &str,
        run_name: &str,
    ) -> Result<Self> {
        let experiment = store.get_or_create_experiment(experiment_name)?;
        let run = store.create_run(&experiment, run_name)?;
        debug!(
            tracking_uri = store.tracking_uri(),
            experiment_id = experiment.experiment_id(),
            run_id = run.run_id(),
            "tracking session opened"
        );
        Ok(Self {
            store,
            experiment,
            run,
            closed: false,
        })
    }

    /// The run this session writes to.
    #[must_use]
    pub const fn run(&self) -> &RunInfo {
        &self.run
    }

    /// The experiment the run belongs to.
    #[must_use]
    pub const fn experiment(&self) -> &ExperimentRecord {
        &self.experiment
    }

    /// Storage scheme of the run's artifact URI.
    #[must_use]
    pub fn storage_scheme(&self) -> StorageScheme {
        StorageScheme::of_uri(self.run.artifact_uri())
    }

    /// Record a parameter.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn log_param(&self, key: &str, value: impl ParamValue) -> Result<()> {
        self.store
            .log_param(&ParamRecord::new(self.run.run_id(), key, value))
    }

    /// Record a metric at step 0.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.log_metric_at(key, value, 0)
    }

    /// Record a metric at `step`.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn log_metric_at(&self, key: &str, value: f64, step: u64) -> Result<()> {
        self.store
            .log_metric(&MetricRecord::new(self.run.run_id(), key, step, value))
    }

    /// Store an artifact under the run's artifact root.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn log_artifact(&self, path: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        self.store.log_artifact(&self.run, path, bytes)
    }

    /// Write an artifact straight to the run's `file:` artifact location,
    /// bypassing the store.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Tracking`] if the run's artifacts are not local,
    /// [`crate::Error::Io`] if the write fails.
    pub fn write_local_artifact(&self, path: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        super::file_store::write_local_artifact(&self.run, path, bytes)
    }

    /// Register the model at `source` under `name`.
    ///
    /// # Errors
    ///
    /// Store failure, including stores without a registry.
    pub fn register_model(&self, name: &str, source: &str) -> Result<ModelVersionRecord> {
        self.store.register_model(&self.run, name, source)
    }

    /// Close the run as `Success` and return its final state.
    ///
    /// # Errors
    ///
    /// Store failure while persisting the status; the run is not retried.
    pub fn finish(self) -> Result<RunInfo> {
        self.close(RunStatus::Success)
    }

    /// Close the run with an explicit terminal status.
    ///
    /// # Errors
    ///
    /// Store failure while persisting the status.
    pub fn close(mut self, status: RunStatus) -> Result<RunInfo> {
        self.closed = true;
        self.run.complete(status);
        self.store.update_run(&self.run)?;
        debug!(run_id = self.run.run_id(), status = status.as_mlflow_str(), "tracking session closed");
        Ok(self.run.clone())
    }
}

impl Drop for TrackingSession<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.run.complete(RunStatus::Failed);
        if let Err(error) = self.store.update_run(&self.run) {
            warn!(run_id = self.run.run_id(), %error, "failed to mark run as failed");
        }
    }
}

impl std::fmt::Debug for TrackingSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSession")
            .field("tracking_uri", &self.store.tracking_uri())
            .field("experiment", &self.experiment)
            .field("run", &self.run)
            .field("closed", &self.closed)
            .finish()
    }
}
