//! # train-eval: ElasticNet training with experiment tracking
//!
//! **Version**: 0.1.0
//!
//! Fits an ElasticNet regressor on a prepared train split, scores it on the
//! test split and files the run with an MLflow-compatible tracking store.
//!
//! ## Pipeline
//!
//! - **config**: `params.yaml` resolved into an immutable [`RunConfig`]
//! - **dataset**: CSV splits partitioned into features and target
//! - **model**: deterministic coordinate-descent ElasticNet (`linfa`)
//! - **metrics**: RMSE, MAE and R² on the test split
//! - **tracking**: params, metrics and the model logged to a file, REST or
//!   in-memory store; remote artifact stores also register the model
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use train_eval::TrainingRunner;
//!
//! let record = TrainingRunner::new().execute("params.yaml")?;
//! println!("run {} r2={}", record.run_id(), record.evaluation().r2);
//! # Ok::<(), train_eval::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod report;
pub mod runner;
pub mod tracking;

pub use config::RunConfig;
pub use error::{Error, Result};
pub use metrics::EvaluationResult;
pub use runner::{ModelLocation, RunRecord, TrainingRunner};
