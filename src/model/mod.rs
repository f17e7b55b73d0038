//! Model fitting seam and the fitted-model handle
//!
//! The runner only talks to [`Fittable`]; [`ElasticNetFitter`] is the
//! production implementation and tests substitute their own.

mod elasticnet;

pub use elasticnet::ElasticNetFitter;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::dataset::SplitDataset;
use crate::{Error, Result};

/// File name of the serialized model inside a model directory or artifact path.
pub const MODEL_FILE_NAME: &str = "model.json";

/// ElasticNet regularisation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Overall penalty strength (>= 0)
    pub alpha: f64,
    /// L1/L2 mix in `[0, 1]`; 1.0 is lasso, 0.0 is ridge
    pub l1_ratio: f64,
}

impl Hyperparameters {
    /// Range check, listing every violation.
    ///
    /// # Errors
    ///
    /// Returns a message describing each out-of-range value.
    pub fn check(&self) -> std::result::Result<(), String> {
        let mut problems = Vec::new();
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            problems.push(format!("alpha must be a finite value >= 0, got {}", self.alpha));
        }
        if !self.l1_ratio.is_finite() || !(0.0..=1.0).contains(&self.l1_ratio) {
            problems.push(format!("l1_ratio must be in [0, 1], got {}", self.l1_ratio));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

/// Something that turns a training split into a [`TrainedModel`].
pub trait Fittable {
    /// Fit on `train` with the given hyperparameters and seed.
    ///
    /// Implementations must be deterministic for identical inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fit`] if the solver rejects the data or parameters.
    fn fit(
        &self,
        hyperparameters: &Hyperparameters,
        random_state: u64,
        train: &SplitDataset,
    ) -> Result<TrainedModel>;
}

impl<T: Fittable + ?Sized> Fittable for &T {
    fn fit(
        &self,
        hyperparameters: &Hyperparameters,
        random_state: u64,
        train: &SplitDataset,
    ) -> Result<TrainedModel> {
        (**self).fit(hyperparameters, random_state, train)
    }
}

/// Fitted linear model: `y = features · coefficients + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    estimator: String,
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    hyperparameters: Hyperparameters,
    random_state: u64,
    n_iterations: u32,
    duality_gap: f64,
}

impl TrainedModel {
    /// Create a builder for a fitted linear model.
    #[must_use]
    pub fn builder(
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> TrainedModelBuilder {
        TrainedModelBuilder::new(feature_names, coefficients, intercept)
    }

    /// Name of the estimator that produced the model.
    #[must_use]
    pub fn estimator(&self) -> &str {
        &self.estimator
    }

    /// Feature names in coefficient order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// One weight per feature.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Bias term.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Hyperparameters used for fitting.
    #[must_use]
    pub const fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Seed the model was fitted with.
    #[must_use]
    pub const fn random_state(&self) -> u64 {
        self.random_state
    }

    /// Solver iterations until convergence (0 when not applicable).
    #[must_use]
    pub const fn n_iterations(&self) -> u32 {
        self.n_iterations
    }

    /// Final duality gap reported by the solver (0 when not applicable).
    #[must_use]
    pub const fn duality_gap(&self) -> f64 {
        self.duality_gap
    }

    /// Predict one value per row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the number of feature columns differs from
    /// the number of coefficients.
    pub fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if features.ncols() != self.coefficients.len() {
            return Err(Error::Schema(format!(
                "model expects {} features, got {}",
                self.coefficients.len(),
                features.ncols()
            )));
        }
        let weights = Array1::from(self.coefficients.clone());
        Ok(features.dot(&weights) + self.intercept)
    }

    /// Serialize to pretty JSON (the on-disk artifact format).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Read a model previously written by [`TrainedModel::to_json_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Builder for `TrainedModel`.
#[derive(Debug)]
pub struct TrainedModelBuilder {
    model: TrainedModel,
}

impl TrainedModelBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(feature_names: Vec<String>, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            model: TrainedModel {
                estimator: "linear".to_string(),
                feature_names,
                coefficients,
                intercept,
                hyperparameters: Hyperparameters {
                    alpha: 0.0,
                    l1_ratio: 0.0,
                },
                random_state: 0,
                n_iterations: 0,
                duality_gap: 0.0,
            },
        }
    }

    /// Set the estimator name.
    #[must_use]
    pub fn estimator(mut self, estimator: impl Into<String>) -> Self {
        self.model.estimator = estimator.into();
        self
    }

    /// Record the hyperparameters and seed used.
    #[must_use]
    pub const fn fitted_with(mut self, hyperparameters: Hyperparameters, random_state: u64) -> Self {
        self.model.hyperparameters = hyperparameters;
        self.model.random_state = random_state;
        self
    }

    /// Record solver diagnostics.
    #[must_use]
    pub const fn solver_stats(mut self, n_iterations: u32, duality_gap: f64) -> Self {
        self.model.n_iterations = n_iterations;
        self.model.duality_gap = duality_gap;
        self
    }

    /// Build the `TrainedModel`.
    #[must_use]
    pub fn build(self) -> TrainedModel {
        self.model
    }
}
