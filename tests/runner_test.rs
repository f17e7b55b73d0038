//! End-to-end runner tests against file, in-memory and REST tracking stores

mod common;

use std::fmt::Write as _;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{ok, MockServer};
use ndarray::ArrayView1;
use reqwest::Url;
use tempfile::TempDir;
use train_eval::dataset::SplitDataset;
use train_eval::metrics::MetricsEvaluator;
use train_eval::model::{Fittable, Hyperparameters, TrainedModel};
use train_eval::tracking::{
    ArtifactRecord, ExperimentRecord, FileStore, MemoryStore, MetricRecord, ModelVersionRecord,
    ParamRecord, RestStore, RunInfo, RunStatus, TrackingStore,
};
use train_eval::{Error, EvaluationResult, ModelLocation, RunConfig, TrainingRunner};

// =============================================================================
// Fixtures
// =============================================================================

/// `y = 3*x1 - 2*x2 + 1` plus a small deterministic wobble.
fn rows(range: std::ops::Range<u32>) -> Vec<[f64; 3]> {
    range
        .map(|i| {
            let x1 = f64::from(i) * 0.5;
            let x2 = f64::from((i * i) % 7);
            let wobble = if i % 2 == 0 { 0.05 } else { -0.05 };
            [x1, x2, 3.0 * x1 - 2.0 * x2 + 1.0 + wobble]
        })
        .collect()
}

fn write_csv(path: &Path, header: &str, rows: &[[f64; 3]]) {
    let mut text = format!("{header}\n");
    for row in rows {
        writeln!(text, "{},{},{}", row[0], row[1], row[2]).unwrap();
    }
    fs::write(path, text).unwrap();
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: TempDir::new().unwrap(),
        };
        write_csv(&ws.path("train.csv"), "x1,x2,target", &rows(0..40));
        write_csv(&ws.path("test.csv"), "x1,x2,target", &rows(40..50));
        ws
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn yaml(&self, tracking_uri: &str) -> String {
        format!(
            r"
base:
  random_state: 42
  target_col: target
split_data:
  train_path: '{train}'
  test_path: '{test}'
estimators:
  ElasticNet:
    params:
      alpha: 0.5
      l1_ratio: 0.5
model_dir: '{model_dir}'
reports:
  params: '{params}'
  scores: '{scores}'
mlflow_config:
  experiment_name: ElasticNet regression
  run_name: mlops
  registered_model_name: ElasticnetWineModel
  remote_server_uri: '{tracking_uri}'
  request_timeout_secs: 2
",
            train = self.path("train.csv").display(),
            test = self.path("test.csv").display(),
            model_dir = self.path("saved_models").display(),
            params = self.path("report/params.json").display(),
            scores = self.path("report/scores.json").display(),
        )
    }

    fn config(&self) -> RunConfig {
        RunConfig::from_yaml_str(&self.yaml(&self.path("mlruns").display().to_string())).unwrap()
    }
}

/// Delegates to a [`MemoryStore`] but refuses every registration.
struct RefusingRegistry(MemoryStore);

impl TrackingStore for RefusingRegistry {
    fn tracking_uri(&self) -> &str {
        self.0.tracking_uri()
    }
    fn get_or_create_experiment(&self, name: &str) -> train_eval::Result<ExperimentRecord> {
        self.0.get_or_create_experiment(name)
    }
    fn create_run(&self, experiment: &ExperimentRecord, run_name: &str) -> train_eval::Result<RunInfo> {
        self.0.create_run(experiment, run_name)
    }
    fn log_param(&self, param: &ParamRecord) -> train_eval::Result<()> {
        self.0.log_param(param)
    }
    fn log_metric(&self, metric: &MetricRecord) -> train_eval::Result<()> {
        self.0.log_metric(metric)
    }
    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: &[u8]) -> train_eval::Result<ArtifactRecord> {
        self.0.log_artifact(run, path, bytes)
    }
    fn register_model(&self, _run: &RunInfo, name: &str, _source: &str) -> train_eval::Result<ModelVersionRecord> {
        Err(Error::Tracking(format!("registry refused `{name}`")))
    }
    fn update_run(&self, run: &RunInfo) -> train_eval::Result<()> {
        self.0.update_run(run)
    }
}

/// Predicts a constant, whatever the data.
struct ConstantFitter(f64);

impl Fittable for ConstantFitter {
    fn fit(
        &self,
        hyperparameters: &Hyperparameters,
        random_state: u64,
        train: &SplitDataset,
    ) -> train_eval::Result<TrainedModel> {
        let names = train.feature_names().to_vec();
        let zeros = vec![0.0; names.len()];
        Ok(TrainedModel::builder(names, zeros, self.0)
            .estimator("constant")
            .fitted_with(*hyperparameters, random_state)
            .build())
    }
}

struct FailingFitter;

impl Fittable for FailingFitter {
    fn fit(
        &self,
        _hyperparameters: &Hyperparameters,
        _random_state: u64,
        _train: &SplitDataset,
    ) -> train_eval::Result<TrainedModel> {
        Err(Error::Fit("solver did not converge".to_string()))
    }
}

/// Returns fixed scores, provided every prediction equals `expected`.
struct FixedScores {
    expected: f64,
    scores: EvaluationResult,
}

impl MetricsEvaluator for FixedScores {
    fn evaluate(
        &self,
        predicted: ArrayView1<'_, f64>,
        actual: ArrayView1<'_, f64>,
    ) -> train_eval::Result<EvaluationResult> {
        if predicted.len() != actual.len() || predicted.iter().any(|p| *p != self.expected) {
            return Err(Error::Schema("unexpected predictions".to_string()));
        }
        Ok(self.scores)
    }
}

const FIXED: EvaluationResult = EvaluationResult {
    rmse: 1.25,
    mae: 0.75,
    r2: 0.5,
};

fn file_url(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

fn experiment_body(artifact_location: &str) -> (u16, String) {
    ok(format!(
        r#"{{"experiment":{{"experiment_id":"1","name":"ElasticNet regression","artifact_location":"{artifact_location}"}}}}"#
    ))
}

fn run_body(artifact_uri: &str) -> (u16, String) {
    ok(format!(
        r#"{{"run":{{"info":{{"run_id":"abc","experiment_id":"1","artifact_uri":"{artifact_uri}","start_time":1700000000000}}}}}}"#
    ))
}

/// Answers for experiment lookup, run creation, two params and three metrics.
fn tracking_preamble(artifact_root: &str) -> Vec<(u16, String)> {
    let mut answers = vec![
        experiment_body(artifact_root),
        run_body(&format!("{artifact_root}/abc/artifacts")),
    ];
    answers.extend((0..5).map(|_| ok("{}")));
    answers
}

fn rest_runner(uri: &str) -> TrainingRunner {
    TrainingRunner::new().with_store(RestStore::new(uri, Duration::from_secs(5)).unwrap())
}

// =============================================================================
// Local storage scheme
// =============================================================================

#[test]
fn test_file_store_persists_model_locally() {
    let ws = Workspace::new();
    let config = ws.config();

    let record = TrainingRunner::new().execute_with_config(&config).unwrap();

    let ModelLocation::Local { path, artifact_uri } = record.model_location() else {
        panic!("expected local model, got {:?}", record.model_location());
    };
    assert_eq!(path, &ws.path("saved_models").join("model.json"));
    assert!(artifact_uri.starts_with("file://"));

    let model = TrainedModel::from_json_slice(&fs::read(path).unwrap()).unwrap();
    assert_eq!(model.feature_names(), ["x1", "x2"]);
    assert_eq!(model.random_state(), 42);

    let store = FileStore::open(ws.path("mlruns")).unwrap();
    let run = store.get_run(record.experiment_id(), record.run_id()).unwrap();
    assert_eq!(run.status(), RunStatus::Success);
    assert_eq!(store.get_param(&run, "alpha").unwrap(), "0.5");
    assert_eq!(store.get_param(&run, "l1_ratio").unwrap(), "0.5");
    for key in ["rmse", "mae", "r2"] {
        let history = store.get_metric_history(&run, key).unwrap();
        assert_eq!(history.len(), 1, "{key}");
        assert_eq!(history[0].0, 0);
    }
}

#[test]
fn test_local_scheme_skips_registration() {
    let ws = Workspace::new();
    let store = MemoryStore::with_artifact_root(file_url(&ws.path("artifact-root")));

    let record = TrainingRunner::new()
        .with_store(store.clone())
        .execute_with_config(&ws.config())
        .unwrap();

    assert!(matches!(record.model_location(), ModelLocation::Local { .. }));
    assert!(store.model_versions().is_empty());
    assert!(store.artifacts_for_run(record.run_id()).is_empty());
    assert!(ws.path("saved_models/model.json").is_file());

    let copy = ws
        .path("artifact-root")
        .join(record.experiment_id())
        .join(record.run_id())
        .join("artifacts/model/model.json");
    assert_eq!(fs::read(copy).unwrap(), fs::read(ws.path("saved_models/model.json")).unwrap());
}

#[test]
fn test_remote_server_with_local_artifacts() {
    let ws = Workspace::new();
    let artifact_root = file_url(&ws.path("mlruns/1"));
    let mut answers = tracking_preamble(&artifact_root);
    answers.push(ok("{}"));
    let server = MockServer::start(answers);

    let record = rest_runner(&server.uri).execute_with_config(&ws.config()).unwrap();
    let seen = server.requests();

    let ModelLocation::Local { path, artifact_uri } = record.model_location() else {
        panic!("expected local model, got {:?}", record.model_location());
    };
    assert!(path.is_file());
    assert_eq!(artifact_uri, &format!("{artifact_root}/abc/artifacts/model/model.json"));
    assert!(ws.path("mlruns/1/abc/artifacts/model/model.json").is_file());

    assert_eq!(seen.len(), 8);
    assert!(!seen.iter().any(|r| r.line.starts_with("PUT")));
    assert!(!seen.iter().any(|r| r.line.contains("registered-models")));
    let last = seen.last().unwrap();
    assert!(last.is("POST", "/api/2.0/mlflow/runs/update"));
    assert!(last.body.contains("FINISHED"));
}

// =============================================================================
// Remote storage scheme
// =============================================================================

#[test]
fn test_remote_scheme_registers_model() {
    let ws = Workspace::new();
    let store = MemoryStore::new();

    let record = TrainingRunner::new()
        .with_store(store.clone())
        .execute_with_config(&ws.config())
        .unwrap();

    let ModelLocation::Registered { name, version, source } = record.model_location() else {
        panic!("expected registered model, got {:?}", record.model_location());
    };
    assert_eq!(name, "ElasticnetWineModel");
    assert_eq!(version, "1");
    assert!(source.starts_with("memory://"));
    assert!(source.ends_with("/artifacts/model"));

    let versions = store.model_versions();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].run_id(), record.run_id());

    let bytes = store.artifact_bytes(record.run_id(), "model/model.json").unwrap();
    assert!(TrainedModel::from_json_slice(&bytes).is_ok());
    assert!(!ws.path("saved_models").exists());

    let run = store.get_run(record.run_id()).unwrap();
    assert_eq!(run.status(), RunStatus::Success);
}

#[test]
fn test_registration_failure_marks_run_failed() {
    let ws = Workspace::new();
    let inner = MemoryStore::new();

    let err = TrainingRunner::new()
        .with_store(RefusingRegistry(inner.clone()))
        .execute_with_config(&ws.config())
        .unwrap_err();

    assert!(matches!(err, Error::Tracking(_)));
    let runs = inner.get_runs_for_experiment("1");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status(), RunStatus::Failed);
    assert!(runs[0].ended_at().is_some());
}

#[test]
fn test_remote_server_uploads_and_registers() {
    let ws = Workspace::new();
    let config = RunConfig::from_yaml_str(
        &ws.yaml("http://unused").replace("l1_ratio: 0.5", "l1_ratio: 1.0"),
    )
    .unwrap();
    let mut answers = tracking_preamble("mlflow-artifacts:/1");
    answers.extend([
        ok("{}"),
        ok(r#"{"registered_model":{"name":"ElasticnetWineModel"}}"#),
        ok(r#"{"model_version":{"name":"ElasticnetWineModel","version":"1","source":"mlflow-artifacts:/1/abc/artifacts/model","run_id":"abc"}}"#),
        ok("{}"),
    ]);
    let server = MockServer::start(answers);

    let record = rest_runner(&server.uri).execute_with_config(&config).unwrap();
    let seen = server.requests();

    assert_eq!(
        record.model_location(),
        &ModelLocation::Registered {
            name: "ElasticnetWineModel".to_string(),
            version: "1".to_string(),
            source: "mlflow-artifacts:/1/abc/artifacts/model".to_string(),
        }
    );
    assert!(!ws.path("saved_models").exists());

    let lines: Vec<&str> = seen
        .iter()
        .map(|r| r.line.split_whitespace().take(2).last().unwrap_or_default())
        .collect();
    assert_eq!(
        lines[7..],
        [
            "/api/2.0/mlflow-artifacts/artifacts/1/abc/artifacts/model/model.json",
            "/api/2.0/mlflow/registered-models/create",
            "/api/2.0/mlflow/model-versions/create",
            "/api/2.0/mlflow/runs/update",
        ]
    );
    assert!(TrainedModel::from_json_slice(seen[7].body.as_bytes()).is_ok());
    assert!(seen[9].body.contains(r#""source":"mlflow-artifacts:/1/abc/artifacts/model""#));
    assert!(seen[10].body.contains("FINISHED"));

    let params: Vec<&str> = seen
        .iter()
        .filter(|r| r.is("POST", "/api/2.0/mlflow/runs/log-parameter"))
        .map(|r| r.body.as_str())
        .collect();
    assert_eq!(params.len(), 2);
    assert!(params[1].contains(r#""key":"l1_ratio""#));
    assert!(params[1].contains(r#""value":"1.0""#));
}

#[test]
fn test_unreachable_tracking_server() {
    let ws = Workspace::new();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = RunConfig::from_yaml_str(&ws.yaml(&format!("http://127.0.0.1:{port}"))).unwrap();

    let err = TrainingRunner::new().execute_with_config(&config).unwrap_err();

    assert!(matches!(err, Error::TrackingUnavailable { .. }), "got {err}");
}

// =============================================================================
// Failures before tracking
// =============================================================================

#[test]
fn test_missing_target_creates_no_run() {
    for file in ["train.csv", "test.csv"] {
        let ws = Workspace::new();
        write_csv(&ws.path(file), "x1,x2,label", &rows(0..10));
        let store = MemoryStore::new();

        let err = TrainingRunner::new()
            .with_store(store.clone())
            .execute_with_config(&ws.config())
            .unwrap_err();

        assert!(matches!(err, Error::Schema(ref msg) if msg.contains("target")), "{file}: {err}");
        assert_eq!(store.run_count(), 0, "{file}");
        assert_eq!(store.experiment_count(), 0, "{file}");
    }
}

#[test]
fn test_fit_failure_creates_no_run() {
    let ws = Workspace::new();
    let store = MemoryStore::new();

    let err = TrainingRunner::with_components(FailingFitter, FixedScores {
        expected: 0.0,
        scores: FIXED,
    })
    .with_store(store.clone())
    .execute_with_config(&ws.config())
    .unwrap_err();

    assert!(matches!(err, Error::Fit(_)));
    assert!(store.is_empty());
    assert!(!ws.path("saved_models").exists());
}

#[test]
fn test_unreadable_dataset_creates_no_run() {
    let ws = Workspace::new();
    fs::remove_file(ws.path("train.csv")).unwrap();
    let store = MemoryStore::new();

    let err = TrainingRunner::new()
        .with_store(store.clone())
        .execute_with_config(&ws.config())
        .unwrap_err();

    assert!(matches!(err, Error::DataLoad { .. }));
    assert_eq!(store.run_count(), 0);
}

#[test]
fn test_invalid_config_file() {
    let ws = Workspace::new();
    let yaml = ws
        .yaml(&ws.path("mlruns").display().to_string())
        .replace("alpha: 0.5", "alpha: -0.5");
    fs::write(ws.path("params.yaml"), yaml).unwrap();
    let store = MemoryStore::new();

    let err = TrainingRunner::new()
        .with_store(store.clone())
        .execute(ws.path("params.yaml"))
        .unwrap_err();

    assert!(matches!(err, Error::Config(ref msg) if msg.contains("alpha")));
    assert_eq!(store.run_count(), 0);
}

// =============================================================================
// Results
// =============================================================================

#[test]
fn test_injected_components_reach_record_and_store() {
    let ws = Workspace::new();
    let store = MemoryStore::new();

    let record = TrainingRunner::with_components(ConstantFitter(7.0), FixedScores {
        expected: 7.0,
        scores: FIXED,
    })
    .with_store(store.clone())
    .execute_with_config(&ws.config())
    .unwrap();

    assert_eq!(record.evaluation(), &FIXED);
    for (key, value) in FIXED.as_pairs() {
        let logged = store.get_metrics_for_run(record.run_id(), key);
        assert_eq!(logged.len(), 1, "{key}");
        assert_eq!(logged[0].value(), value, "{key}");
    }

    let bytes = store.artifact_bytes(record.run_id(), "model/model.json").unwrap();
    let model = TrainedModel::from_json_slice(&bytes).unwrap();
    assert_eq!(model.estimator(), "constant");
    assert_eq!(model.intercept(), 7.0);
}

#[test]
fn test_scenario_metrics_are_well_formed() {
    let ws = Workspace::new();

    let record = TrainingRunner::new()
        .with_store(MemoryStore::new())
        .execute_with_config(&ws.config())
        .unwrap();

    let eval = record.evaluation();
    assert!(eval.rmse.is_finite() && eval.rmse >= 0.0);
    assert!(eval.mae.is_finite() && eval.mae >= 0.0);
    assert!(eval.r2.is_finite() && eval.r2 <= 1.0);
    assert!(eval.mae <= eval.rmse + 1e-12);
    assert!((record.hyperparameters().alpha - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_runs_are_deterministic() {
    let ws = Workspace::new();
    let runner = TrainingRunner::new().with_store(MemoryStore::new());

    let first = runner.execute_with_config(&ws.config()).unwrap();
    let second = runner.execute_with_config(&ws.config()).unwrap();

    assert_eq!(first.evaluation(), second.evaluation());
    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(first.experiment_id(), second.experiment_id());
}

#[test]
fn test_reports_are_written() {
    let ws = Workspace::new();

    let record = TrainingRunner::new()
        .with_store(MemoryStore::new())
        .execute_with_config(&ws.config())
        .unwrap();

    let scores: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(ws.path("report/scores.json")).unwrap()).unwrap();
    let params: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(ws.path("report/params.json")).unwrap()).unwrap();

    let close = |value: &serde_json::Value, expected: f64| {
        (value.as_f64().unwrap() - expected).abs() < 1e-12
    };
    assert!(close(&scores["rmse"], record.evaluation().rmse));
    assert!(close(&scores["mae"], record.evaluation().mae));
    assert!(close(&scores["r2"], record.evaluation().r2));
    assert_eq!(params["alpha"], 0.5);
    assert_eq!(params["l1_ratio"], 0.5);
}
