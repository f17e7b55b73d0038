//! Metric and parameter records logged against a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric Record represents a single metric data point.
///
/// Keyed by `run_id` + `key` and ordered by `step`; a single-pass run logs
/// every metric at step 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `key` - Metric name (e.g., "rmse", "r2")
    /// * `step` - Step number
    /// * `value` - Metric value
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A value that can be logged as a run parameter.
///
/// Floats keep a fractional part (`1.0`, not `1`) so the stored string reads
/// the same as one written by other tracking clients.
pub trait ParamValue {
    /// String form sent to the store.
    fn to_param_string(&self) -> String;
}

impl ParamValue for f64 {
    fn to_param_string(&self) -> String {
        format!("{self:?}")
    }
}

impl ParamValue for f32 {
    fn to_param_string(&self) -> String {
        format!("{self:?}")
    }
}

macro_rules! display_param_value {
    ($($ty:ty),*) => {
        $(impl ParamValue for $ty {
            fn to_param_string(&self) -> String {
                self.to_string()
            }
        })*
    };
}

display_param_value!(i32, i64, u32, u64, usize, bool, str, String);

impl<T: ParamValue + ?Sized> ParamValue for &T {
    fn to_param_string(&self) -> String {
        (**self).to_param_string()
    }
}

/// A single hyperparameter logged against a run.
///
/// Values are stored as strings, the way tracking servers keep them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamRecord {
    run_id: String,
    key: String,
    value: String,
}

impl ParamRecord {
    /// Create a parameter record; see [`ParamValue`] for how `value` is rendered.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, value: impl ParamValue) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            value: value.to_param_string(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parameter name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the rendered value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
