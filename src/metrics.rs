//! Regression metrics for a fitted model's test predictions
//!
//! Exactly three metrics are produced: RMSE, MAE and R². The formulas follow
//! the usual definitions:
//!
//! ```text
//! rmse = sqrt(mean((y_pred - y)^2))
//! mae  = mean(|y_pred - y|)
//! r2   = 1 - sum((y_pred - y)^2) / sum((y - mean(y))^2)
//! ```
//!
//! When the target has zero variance, R² is 1.0 for a perfect prediction and
//! 0.0 otherwise, which keeps every value finite.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Metric names as reported to the tracking store.
pub const METRIC_KEYS: [&str; 3] = ["rmse", "mae", "r2"];

/// Outcome of evaluating predictions against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Root mean squared error (>= 0)
    pub rmse: f64,
    /// Mean absolute error (>= 0)
    pub mae: f64,
    /// Coefficient of determination (<= 1)
    pub r2: f64,
}

impl EvaluationResult {
    /// `(name, value)` pairs in reporting order.
    #[must_use]
    pub fn as_pairs(&self) -> [(&'static str, f64); 3] {
        [
            (METRIC_KEYS[0], self.rmse),
            (METRIC_KEYS[1], self.mae),
            (METRIC_KEYS[2], self.r2),
        ]
    }
}

/// Computes an [`EvaluationResult`] from predictions and targets.
pub trait MetricsEvaluator {
    /// Compare `predicted` with `actual`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the lengths differ or are zero.
    fn evaluate(
        &self,
        predicted: ArrayView1<'_, f64>,
        actual: ArrayView1<'_, f64>,
    ) -> Result<EvaluationResult>;
}

impl<T: MetricsEvaluator + ?Sized> MetricsEvaluator for &T {
    fn evaluate(
        &self,
        predicted: ArrayView1<'_, f64>,
        actual: ArrayView1<'_, f64>,
    ) -> Result<EvaluationResult> {
        (**self).evaluate(predicted, actual)
    }
}

/// Default evaluator implementing the formulas above.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegressionEvaluator;

impl MetricsEvaluator for RegressionEvaluator {
    fn evaluate(
        &self,
        predicted: ArrayView1<'_, f64>,
        actual: ArrayView1<'_, f64>,
    ) -> Result<EvaluationResult> {
        if predicted.len() != actual.len() {
            return Err(Error::Schema(format!(
                "{} predictions for {} targets",
                predicted.len(),
                actual.len()
            )));
        }
        let Some(mean) = actual.mean() else {
            return Err(Error::Schema("cannot evaluate on an empty test set".to_string()));
        };

        let residuals = &predicted - &actual;
        let sse = residuals.mapv(|r| r * r).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = actual.len() as f64;

        let rmse = (sse / n).sqrt();
        let mae = residuals.mapv(f64::abs).sum() / n;

        let sst = actual.mapv(|y| (y - mean) * (y - mean)).sum();
        let r2 = if sst > 0.0 {
            1.0 - sse / sst
        } else if sse == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(EvaluationResult { rmse, mae, r2 })
    }
}
