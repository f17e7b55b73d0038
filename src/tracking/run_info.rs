//! Run Info - one execution of an experiment as seen by the tracking store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but not yet started.
    Pending,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Success,
    /// Run failed with an error.
    Failed,
    /// Run was cancelled by user or system.
    Cancelled,
}

impl RunStatus {
    /// Wire name used by MLflow-compatible servers.
    #[must_use]
    pub const fn as_mlflow_str(self) -> &'static str {
        match self {
            Self::Pending => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Success => "FINISHED",
            Self::Failed => "FAILED",
            Self::Cancelled => "KILLED",
        }
    }

    /// Numeric code used in MLflow file-store metadata.
    #[must_use]
    pub const fn as_mlflow_code(self) -> u8 {
        match self {
            Self::Running => 1,
            Self::Pending => 2,
            Self::Success => 3,
            Self::Failed => 4,
            Self::Cancelled => 5,
        }
    }

    /// Inverse of [`RunStatus::as_mlflow_code`].
    #[must_use]
    pub const fn from_mlflow_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Running),
            2 => Some(Self::Pending),
            3 => Some(Self::Success),
            4 => Some(Self::Failed),
            5 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the run has reached a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// Run Info represents a single execution of an experiment.
///
/// A run moves from `Pending` to `Running` when the store creates it and to
/// a terminal status when the tracking session is finalised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInfo {
    run_id: String,
    experiment_id: String,
    run_name: String,
    status: RunStatus,
    artifact_uri: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunInfo {
    /// Create a new run in Pending status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run
    /// * `experiment_id` - ID of the parent experiment
    /// * `run_name` - Human-readable run name
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> Self {
        Self::builder(run_id, experiment_id, run_name).build()
    }

    /// Create a builder for constructing a run with optional fields.
    #[must_use]
    pub fn builder(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> RunInfoBuilder {
        RunInfoBuilder::new(run_id, experiment_id, run_name)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the run name.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the root URI under which this run's artifacts live.
    #[must_use]
    pub fn artifact_uri(&self) -> &str {
        &self.artifact_uri
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Start the run, transitioning from Pending to Running.
    ///
    /// Sets the `started_at` timestamp to now.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Complete the run with the given final status.
    ///
    /// Sets the `ended_at` timestamp to now.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// Builder for `RunInfo`.
#[derive(Debug)]
pub struct RunInfoBuilder {
    run_id: String,
    experiment_id: String,
    run_name: String,
    status: RunStatus,
    artifact_uri: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunInfoBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            run_name: run_name.into(),
            status: RunStatus::Pending,
            artifact_uri: String::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Set the artifact root URI.
    #[must_use]
    pub fn artifact_uri(mut self, uri: impl Into<String>) -> Self {
        self.artifact_uri = uri.into();
        self
    }

    /// Mark the run as already running since `started_at`.
    #[must_use]
    pub const fn running_since(mut self, started_at: DateTime<Utc>) -> Self {
        self.status = RunStatus::Running;
        self.started_at = Some(started_at);
        self
    }

    /// Mark the run as finished with `status` at `ended_at` (used when reading from a store).
    #[must_use]
    pub const fn ended(mut self, status: RunStatus, ended_at: DateTime<Utc>) -> Self {
        self.status = status;
        self.ended_at = Some(ended_at);
        self
    }

    /// Build the `RunInfo`.
    #[must_use]
    pub fn build(self) -> RunInfo {
        RunInfo {
            run_id: self.run_id,
            experiment_id: self.experiment_id,
            run_name: self.run_name,
            status: self.status,
            artifact_uri: self.artifact_uri,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_default() {
        let run = RunInfo::new("run-1", "exp-1", "mlops");
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.artifact_uri().is_empty());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = RunInfo::new("run-1", "exp-1", "mlops");
        run.start();
        assert_eq!(run.status(), RunStatus::Running);
        assert!(!run.status().is_terminal());
        run.complete(RunStatus::Success);
        assert_eq!(run.status(), RunStatus::Success);
        assert!(run.ended_at().is_some());
    }

    #[test]
    fn test_mlflow_names() {
        assert_eq!(RunStatus::Success.as_mlflow_str(), "FINISHED");
        assert_eq!(RunStatus::Failed.as_mlflow_str(), "FAILED");
        assert_eq!(RunStatus::Running.as_mlflow_code(), 1);
        assert_eq!(RunStatus::Success.as_mlflow_code(), 3);
        assert_eq!(RunStatus::from_mlflow_code(4), Some(RunStatus::Failed));
        assert_eq!(RunStatus::from_mlflow_code(9), None);
    }
}
