//! Memory Store - in-process tracking store
//!
//! Keeps every record in memory. Used by tests and for dry runs where
//! nothing should touch disk or network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use super::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ModelVersionRecord, ParamRecord, RunInfo,
    TrackingStore,
};
use crate::{Error, Result};

/// Artifact root used unless [`MemoryStore::with_artifact_root`] overrides it.
pub const DEFAULT_ARTIFACT_ROOT: &str = "memory://artifacts";

#[derive(Debug, Default)]
struct State {
    experiments: HashMap<String, ExperimentRecord>,
    runs: HashMap<String, RunInfo>,
    params: Vec<ParamRecord>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<(ArtifactRecord, Vec<u8>)>,
    model_versions: Vec<ModelVersionRecord>,
}

/// In-memory store for experiment tracking data.
///
/// ## Design
///
/// Clones share one underlying state, so a test can hand a clone to the
/// runner and inspect what was logged through the handle it kept.
///
/// The `get_metrics_for_run` query returns metrics ordered by step.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    artifact_root: String,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store with the `memory://` artifact root.
    #[must_use]
    pub fn new() -> Self {
        Self::with_artifact_root(DEFAULT_ARTIFACT_ROOT)
    }

    /// Create a store whose run artifact URIs live under `root`.
    ///
    /// A `file://` root makes runs look local to the runner.
    #[must_use]
    pub fn with_artifact_root(root: impl Into<String>) -> Self {
        Self {
            artifact_root: root.into().trim_end_matches('/').to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if the store is empty (no experiments, runs, or metrics).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.experiments.is_empty() && state.runs.is_empty() && state.metrics.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.lock().experiments.len()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.lock().runs.len()
    }

    /// Get the number of metrics in the store.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.lock().metrics.len()
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<RunInfo> {
        self.lock().runs.get(run_id).cloned()
    }

    /// Get all runs for an experiment.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment_id: &str) -> Vec<RunInfo> {
        self.lock()
            .runs
            .values()
            .filter(|run| run.experiment_id() == experiment_id)
            .cloned()
            .collect()
    }

    /// Get metrics for a specific run and key, ordered by step.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use train_eval::tracking::{MemoryStore, MetricRecord, TrackingStore};
    ///
    /// let store = MemoryStore::new();
    /// for step in (0..3).rev() {
    ///     store.log_metric(&MetricRecord::new("run-001", "loss", step, 1.0))?;
    /// }
    ///
    /// let steps: Vec<u64> = store
    ///     .get_metrics_for_run("run-001", "loss")
    ///     .iter()
    ///     .map(MetricRecord::step)
    ///     .collect();
    /// assert_eq!(steps, vec![0, 1, 2]);
    /// # Ok::<(), train_eval::Error>(())
    /// ```
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .lock()
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();

        metrics.sort_by_key(MetricRecord::step);
        metrics
    }

    /// Parameters logged against a run, in logging order.
    #[must_use]
    pub fn params_for_run(&self, run_id: &str) -> Vec<ParamRecord> {
        self.lock()
            .params
            .iter()
            .filter(|p| p.run_id() == run_id)
            .cloned()
            .collect()
    }

    /// Artifact records logged against a run.
    #[must_use]
    pub fn artifacts_for_run(&self, run_id: &str) -> Vec<ArtifactRecord> {
        self.lock()
            .artifacts
            .iter()
            .filter(|(record, _)| record.run_id() == run_id)
            .map(|(record, _)| record.clone())
            .collect()
    }

    /// Stored bytes of an artifact.
    #[must_use]
    pub fn artifact_bytes(&self, run_id: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .artifacts
            .iter()
            .find(|(record, _)| record.run_id() == run_id && record.path() == path)
            .map(|(_, bytes)| bytes.clone())
    }

    /// All registered model versions.
    #[must_use]
    pub fn model_versions(&self) -> Vec<ModelVersionRecord> {
        self.lock().model_versions.clone()
    }
}

impl TrackingStore for MemoryStore {
    fn tracking_uri(&self) -> &str {
        "memory://"
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.experiments.values().find(|e| e.name() == name) {
            return Ok(existing.clone());
        }

        let experiment_id = (state.experiments.len() + 1).to_string();
        let experiment = ExperimentRecord::new(experiment_id.clone(), name)
            .with_artifact_location(format!("{}/{experiment_id}", self.artifact_root));
        state.experiments.insert(experiment_id, experiment.clone());
        Ok(experiment)
    }

    fn create_run(&self, experiment: &ExperimentRecord, run_name: &str) -> Result<RunInfo> {
        let mut state = self.lock();
        if !state.experiments.contains_key(experiment.experiment_id()) {
            return Err(Error::Tracking(format!(
                "unknown experiment `{}`",
                experiment.experiment_id()
            )));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let run = RunInfo::builder(run_id.clone(), experiment.experiment_id(), run_name)
            .artifact_uri(format!(
                "{}/{}/{run_id}/artifacts",
                self.artifact_root,
                experiment.experiment_id()
            ))
            .running_since(Utc::now())
            .build();
        state.runs.insert(run_id, run.clone());
        Ok(run)
    }

    fn log_param(&self, param: &ParamRecord) -> Result<()> {
        self.lock().params.push(param.clone());
        Ok(())
    }

    fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        self.lock().metrics.push(metric.clone());
        Ok(())
    }

    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        let uri = format!("{}/{path}", run.artifact_uri());
        let record = ArtifactRecord::for_bytes(run.run_id(), path, uri, bytes);
        self.lock().artifacts.push((record.clone(), bytes.to_vec()));
        Ok(record)
    }

    fn register_model(
        &self,
        run: &RunInfo,
        name: &str,
        source: &str,
    ) -> Result<ModelVersionRecord> {
        let mut state = self.lock();
        let version = state
            .model_versions
            .iter()
            .filter(|v| v.name() == name)
            .count()
            + 1;
        let record = ModelVersionRecord::new(name, version.to_string(), source, run.run_id());
        state.model_versions.push(record.clone());
        Ok(record)
    }

    fn update_run(&self, run: &RunInfo) -> Result<()> {
        let mut state = self.lock();
        match state.runs.get_mut(run.run_id()) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(Error::Tracking(format!("unknown run `{}`", run.run_id()))),
        }
    }
}
