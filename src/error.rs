//! Error types for train-eval
//!
//! Every failure aborts the run; variants name the stage that failed.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// train-eval error types
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration document missing a field or holding an invalid value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset file unreadable or malformed
    #[error("Data load error: {path}: {reason}")]
    DataLoad {
        /// Path of the offending dataset
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Column layout does not match what the run needs
    #[error("Schema error: {0}")]
    Schema(String),

    /// Solver rejected the training data or hyperparameters
    #[error("Model fit failed: {0}")]
    Fit(String),

    /// Tracking endpoint could not be reached
    #[error("Tracking server unavailable at {uri}: {reason}")]
    TrackingUnavailable {
        /// Tracking URI that was contacted
        uri: String,
        /// Transport-level failure
        reason: String,
    },

    /// Tracking endpoint answered but refused the request
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::DataLoad`] for `path`.
    pub fn data_load(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Self::DataLoad {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`Error::TrackingUnavailable`] for `uri`.
    pub fn tracking_unavailable(uri: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TrackingUnavailable {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}
