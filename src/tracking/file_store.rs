//! File Store - MLflow-style tracking directory on the local filesystem
//!
//! ```text
//! <root>/
//!   <experiment_id>/meta.yaml
//!   <experiment_id>/<run_id>/meta.yaml
//!                            params/<key>
//!                            metrics/<key>        "<timestamp_ms> <value> <step>" per line
//!                            tags/mlflow.runName
//!                            artifacts/...
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ModelVersionRecord, ParamRecord, RunInfo,
    RunStatus, TrackingStore,
};
use crate::{Error, Result};

const META_FILE: &str = "meta.yaml";
const RUN_NAME_TAG: &str = "mlflow.runName";
const ACTIVE: &str = "active";

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    artifact_location: String,
    creation_time: i64,
    experiment_id: String,
    lifecycle_stage: String,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri: String,
    end_time: Option<i64>,
    experiment_id: String,
    lifecycle_stage: String,
    run_id: String,
    run_name: String,
    run_uuid: String,
    start_time: i64,
    status: u8,
    user_id: String,
}

/// Tracking store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    uri: String,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the directory cannot be created or resolved.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        let uri = file_url(&root)?;
        debug!(root = %root.display(), "opened file tracking store");
        Ok(Self { root, uri })
    }

    /// Absolute root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a run's metadata.
    #[must_use]
    pub fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.root.join(experiment_id).join(run_id)
    }

    /// Read a run back from disk.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the run does not exist, [`Error::Tracking`] if its
    /// metadata is malformed.
    pub fn get_run(&self, experiment_id: &str, run_id: &str) -> Result<RunInfo> {
        let meta: RunMeta = read_yaml(&self.run_dir(experiment_id, run_id).join(META_FILE))?;
        let status = RunStatus::from_mlflow_code(meta.status).ok_or_else(|| {
            Error::Tracking(format!("run `{run_id}` has status code {}", meta.status))
        })?;

        let mut builder = RunInfo::builder(meta.run_id, meta.experiment_id, meta.run_name)
            .artifact_uri(meta.artifact_uri)
            .running_since(from_millis(meta.start_time));
        if let Some(end_time) = meta.end_time {
            builder = builder.ended(status, from_millis(end_time));
        }
        Ok(builder.build())
    }

    /// Value of a logged parameter.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the parameter was never logged.
    pub fn get_param(&self, run: &RunInfo, key: &str) -> Result<String> {
        let path = self.run_path(run)?.join("params").join(key);
        Ok(fs::read_to_string(path)?)
    }

    /// `(step, value)` pairs of a logged metric, ordered by step.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the metric was never logged, [`Error::Tracking`] on a
    /// malformed line.
    pub fn get_metric_history(&self, run: &RunInfo, key: &str) -> Result<Vec<(u64, f64)>> {
        let path = self.run_path(run)?.join("metrics").join(key);
        let mut history = fs::read_to_string(&path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                parse_metric_line(line).ok_or_else(|| {
                    Error::Tracking(format!("{}: malformed metric line `{line}`", path.display()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        history.sort_by_key(|(step, _)| *step);
        Ok(history)
    }

    fn run_path(&self, run: &RunInfo) -> Result<PathBuf> {
        check_segment(run.experiment_id())?;
        check_segment(run.run_id())?;
        Ok(self.run_dir(run.experiment_id(), run.run_id()))
    }

    fn run_dir_by_id(&self, run_id: &str) -> Result<PathBuf> {
        check_segment(run_id)?;
        for meta in self.experiments()? {
            let dir = self.run_dir(&meta.experiment_id, run_id);
            if dir.is_dir() {
                return Ok(dir);
            }
        }
        Err(Error::Tracking(format!("unknown run `{run_id}`")))
    }

    fn experiments(&self) -> Result<Vec<ExperimentMeta>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_experiment = entry.file_type()?.is_dir()
                && entry.file_name().to_str().is_some_and(|n| n.parse::<u64>().is_ok());
            let meta_path = entry.path().join(META_FILE);
            if is_experiment && meta_path.is_file() {
                found.push(read_yaml(&meta_path)?);
            }
        }
        Ok(found)
    }
}

impl TrackingStore for FileStore {
    fn tracking_uri(&self) -> &str {
        &self.uri
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        let experiments = self.experiments()?;
        let existing = experiments
            .iter()
            .find(|m| m.name == name && m.lifecycle_stage == ACTIVE);
        if let Some(meta) = existing {
            return Ok(meta.to_record());
        }

        let next_id = experiments
            .iter()
            .filter_map(|m| m.experiment_id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let experiment_id = next_id.to_string();
        let dir = self.root.join(&experiment_id);
        fs::create_dir_all(&dir)?;

        let meta = ExperimentMeta {
            artifact_location: file_url(&dir)?,
            creation_time: Utc::now().timestamp_millis(),
            experiment_id,
            lifecycle_stage: ACTIVE.to_string(),
            name: name.to_string(),
        };
        write_yaml(&dir.join(META_FILE), &meta)?;
        debug!(experiment_id = %meta.experiment_id, name, "created experiment");
        Ok(meta.to_record())
    }

    fn create_run(&self, experiment: &ExperimentRecord, run_name: &str) -> Result<RunInfo> {
        check_segment(experiment.experiment_id())?;
        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = self.run_dir(experiment.experiment_id(), &run_id);
        let artifacts = run_dir.join("artifacts");
        for sub in ["params", "metrics", "tags"] {
            fs::create_dir_all(run_dir.join(sub))?;
        }
        fs::create_dir_all(&artifacts)?;

        let started_at = Utc::now();
        let run = RunInfo::builder(run_id, experiment.experiment_id(), run_name)
            .artifact_uri(file_url(&artifacts)?)
            .running_since(started_at)
            .build();

        write_yaml(&run_dir.join(META_FILE), &RunMeta::from_run(&run))?;
        fs::write(run_dir.join("tags").join(RUN_NAME_TAG), run_name)?;
        debug!(run_id = run.run_id(), experiment_id = run.experiment_id(), "created run");
        Ok(run)
    }

    fn log_param(&self, param: &ParamRecord) -> Result<()> {
        check_key(param.key())?;
        let dir = self.run_dir_by_id(param.run_id())?.join("params");
        fs::write(dir.join(param.key()), param.value())?;
        Ok(())
    }

    fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        check_key(metric.key())?;
        let path = self.run_dir_by_id(metric.run_id())?.join("metrics").join(metric.key());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(
            file,
            "{} {} {}",
            metric.timestamp().timestamp_millis(),
            metric.value(),
            metric.step()
        )?;
        Ok(())
    }

    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        write_artifact(&self.run_path(run)?.join("artifacts"), run, path, bytes)
    }

    fn register_model(
        &self,
        _run: &RunInfo,
        name: &str,
        _source: &str,
    ) -> Result<ModelVersionRecord> {
        Err(Error::Tracking(format!(
            "file store at {} has no model registry; cannot register `{name}`",
            self.uri
        )))
    }

    fn update_run(&self, run: &RunInfo) -> Result<()> {
        let path = self.run_path(run)?.join(META_FILE);
        let mut meta: RunMeta = read_yaml(&path)?;
        meta.status = run.status().as_mlflow_code();
        meta.end_time = run.ended_at().map(|t| t.timestamp_millis());
        write_yaml(&path, &meta)?;
        debug!(run_id = run.run_id(), status = run.status().as_mlflow_str(), "updated run");
        Ok(())
    }
}

impl ExperimentMeta {
    fn to_record(&self) -> ExperimentRecord {
        ExperimentRecord::new(self.experiment_id.clone(), self.name.clone())
            .with_artifact_location(self.artifact_location.clone())
    }
}

impl RunMeta {
    fn from_run(run: &RunInfo) -> Self {
        Self {
            artifact_uri: run.artifact_uri().to_string(),
            end_time: run.ended_at().map(|t| t.timestamp_millis()),
            experiment_id: run.experiment_id().to_string(),
            lifecycle_stage: ACTIVE.to_string(),
            run_id: run.run_id().to_string(),
            run_name: run.run_name().to_string(),
            run_uuid: run.run_id().to_string(),
            start_time: run.started_at().unwrap_or_else(Utc::now).timestamp_millis(),
            status: run.status().as_mlflow_code(),
            user_id: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

/// Write `bytes` under a run's `file:` artifact URI on this machine.
///
/// Works whichever store created the run, so a remote tracking server that
/// hands out local artifact locations is written to directly.
///
/// # Errors
///
/// [`Error::Tracking`] if the artifact URI is not a `file:` URL or `path`
/// leaves the artifact root, [`Error::Io`] if the write fails.
pub(crate) fn write_local_artifact(
    run: &RunInfo,
    path: &str,
    bytes: &[u8],
) -> Result<ArtifactRecord> {
    let root = Url::parse(run.artifact_uri())
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .ok_or_else(|| {
            Error::Tracking(format!(
                "artifact location `{}` is not a local path",
                run.artifact_uri()
            ))
        })?;
    write_artifact(&root, run, path, bytes)
}

fn write_artifact(root: &Path, run: &RunInfo, path: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
    check_relative(path)?;
    let target = root.join(path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, bytes)?;
    debug!(run_id = run.run_id(), path, size = bytes.len(), "wrote artifact");
    Ok(ArtifactRecord::for_bytes(run.run_id(), path, file_url(&target)?, bytes))
}

fn file_url(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|()| Error::Tracking(format!("cannot express {} as a file URL", path.display())))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn parse_metric_line(line: &str) -> Option<(u64, f64)> {
    let mut fields = line.split_whitespace();
    let _timestamp = fields.next()?;
    let value = fields.next()?.parse().ok()?;
    let step = fields.next().map_or(Some(0), |s| s.parse().ok())?;
    Some((step, value))
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| Error::Tracking(format!("{}: {e}", path.display())))
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value)
        .map_err(|e| Error::Tracking(format!("{}: {e}", path.display())))?;
    fs::write(path, text)?;
    Ok(())
}

// Ids become directory names.
fn check_segment(segment: &str) -> Result<()> {
    let valid = !segment.is_empty()
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Tracking(format!("invalid id `{segment}`")))
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(Error::Tracking(format!("invalid key `{key}`")));
    }
    Ok(())
}

fn check_relative(path: &str) -> Result<()> {
    let path = Path::new(path);
    let escapes = path.components().any(|c| !matches!(c, Component::Normal(_)));
    if path.as_os_str().is_empty() || escapes {
        return Err(Error::Tracking(format!(
            "artifact path `{}` must be relative and stay inside the run",
            path.display()
        )));
    }
    Ok(())
}
