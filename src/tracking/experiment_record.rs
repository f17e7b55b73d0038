//! Experiment Record - named group of runs

use serde::{Deserialize, Serialize};

/// A tracked experiment as reported by a store.
///
/// Looked up by name. The artifact location is where the store roots the
/// artifacts of runs created in the experiment; it is `None` when the store
/// did not report one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact_location: Option<String>,
}

impl ExperimentRecord {
    /// Experiment without a known artifact location.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            artifact_location: None,
        }
    }

    /// Attach the store-reported artifact location.
    #[must_use]
    pub fn with_artifact_location(mut self, location: impl Into<String>) -> Self {
        self.artifact_location = Some(location.into());
        self
    }

    /// Store-assigned ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root artifact location, if the store reported one.
    #[must_use]
    pub fn artifact_location(&self) -> Option<&str> {
        self.artifact_location.as_deref()
    }
}
