//! REST Store - client for an MLflow-compatible tracking server
//!
//! Speaks the `/api/2.0/mlflow` REST API with a blocking client. Artifacts
//! are uploaded through the server's `mlflow-artifacts` proxy.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ModelVersionRecord, ParamRecord, RunInfo,
    TrackingStore,
};
use crate::{Error, Result};

const PROXY_SCHEME: &str = "mlflow-artifacts";
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";
const RESOURCE_ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// Non-2xx answer from the server.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error_code: String,
    message: String,
}

impl ApiError {
    fn into_error(self, endpoint: &str) -> Error {
        Error::Tracking(format!(
            "{endpoint} returned {} {}: {}",
            self.status.as_u16(),
            self.error_code,
            self.message
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentPayload,
}

#[derive(Debug, Deserialize)]
struct ExperimentPayload {
    experiment_id: String,
    name: String,
    artifact_location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunPayload,
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    info: RunInfoPayload,
}

#[derive(Debug, Deserialize)]
struct RunInfoPayload {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    artifact_uri: String,
    start_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersionPayload,
}

#[derive(Debug, Deserialize)]
struct ModelVersionPayload {
    name: String,
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    run_id: String,
}

#[derive(Debug, Serialize)]
struct Tag<'a> {
    key: &'a str,
    value: &'a str,
}

/// Tracking store talking to a remote server over HTTP.
#[derive(Debug, Clone)]
pub struct RestStore {
    uri: String,
    client: Client,
}

impl RestStore {
    /// Create a client for the server at `uri` with a per-request `timeout`.
    ///
    /// No request is made until the first store call.
    ///
    /// # Errors
    ///
    /// [`Error::Tracking`] if the HTTP client cannot be built.
    pub fn new(uri: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Tracking(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            uri: uri.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{endpoint}", self.uri)
    }

    fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let request = self.client.post(self.api_url(endpoint)).json(body);
        self.execute(endpoint, request)?
            .map_err(|api| api.into_error(endpoint))
    }

    /// Send `request`; transport failures are errors, API refusals are `Ok(Err(_))`.
    fn execute<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<std::result::Result<R, ApiError>> {
        debug!(endpoint, "tracking request");
        let response = request.send().map_err(|e| self.transport_error(&e))?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().map_err(|e| self.transport_error(&e))?;
            // empty object for endpoints without a response payload
            let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
            let parsed = serde_json::from_str(body)
                .map_err(|e| Error::Tracking(format!("{endpoint}: malformed response: {e}")))?;
            return Ok(Ok(parsed));
        }

        let text = response.text().unwrap_or_default();
        let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or(ApiErrorBody {
            error_code: String::new(),
            message: text,
        });
        Ok(Err(ApiError {
            status,
            error_code: body.error_code,
            message: body.message,
        }))
    }

    fn transport_error(&self, error: &reqwest::Error) -> Error {
        if error.is_connect() || error.is_timeout() {
            Error::tracking_unavailable(&self.uri, error)
        } else {
            Error::Tracking(format!("request to {} failed: {error}", self.uri))
        }
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        let endpoint = "experiments/get-by-name";
        let request = self
            .client
            .get(self.api_url(endpoint))
            .query(&[("experiment_name", name)]);

        match self.execute::<ExperimentResponse>(endpoint, request)? {
            Ok(response) => Ok(Some(response.experiment.into_record())),
            Err(api) if api.error_code == RESOURCE_DOES_NOT_EXIST => Ok(None),
            Err(api) => Err(api.into_error(endpoint)),
        }
    }

    /// Upload path under the proxy for an `mlflow-artifacts:` run artifact URI.
    fn proxy_url(&self, artifact_uri: &str, path: &str) -> Result<String> {
        let parsed = Url::parse(artifact_uri).ok().filter(|u| u.scheme() == PROXY_SCHEME);
        let Some(parsed) = parsed else {
            return Err(Error::Tracking(format!(
                "cannot upload to artifact location `{artifact_uri}`; only {PROXY_SCHEME}: is supported"
            )));
        };
        let root = parsed.path().trim_matches('/');
        Ok(format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{root}/{}",
            self.uri,
            path.trim_start_matches('/')
        ))
    }
}

impl ExperimentPayload {
    fn into_record(self) -> ExperimentRecord {
        let record = ExperimentRecord::new(self.experiment_id, self.name);
        match self.artifact_location {
            Some(location) => record.with_artifact_location(location),
            None => record,
        }
    }
}

impl TrackingStore for RestStore {
    fn tracking_uri(&self) -> &str {
        &self.uri
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        if let Some(existing) = self.get_experiment_by_name(name)? {
            return Ok(existing);
        }

        let created: CreateExperimentResponse =
            self.post("experiments/create", &json!({ "name": name }))?;
        debug!(experiment_id = %created.experiment_id, name, "created experiment");
        // re-read to pick up the server-assigned artifact location
        Ok(self
            .get_experiment_by_name(name)?
            .unwrap_or_else(|| ExperimentRecord::new(created.experiment_id, name)))
    }

    fn create_run(&self, experiment: &ExperimentRecord, run_name: &str) -> Result<RunInfo> {
        let started_at = Utc::now();
        let response: RunResponse = self.post(
            "runs/create",
            &json!({
                "experiment_id": experiment.experiment_id(),
                "run_name": run_name,
                "start_time": started_at.timestamp_millis(),
                "tags": [Tag { key: "mlflow.runName", value: run_name }],
            }),
        )?;

        let info = response.run.info;
        let started_at = info
            .start_time
            .and_then(|t| Utc.timestamp_millis_opt(t).single())
            .unwrap_or(started_at);
        Ok(RunInfo::builder(info.run_id, info.experiment_id, run_name)
            .artifact_uri(info.artifact_uri)
            .running_since(started_at)
            .build())
    }

    fn log_param(&self, param: &ParamRecord) -> Result<()> {
        let _: serde_json::Value = self.post(
            "runs/log-parameter",
            &json!({ "run_id": param.run_id(), "key": param.key(), "value": param.value() }),
        )?;
        Ok(())
    }

    fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        let _: serde_json::Value = self.post(
            "runs/log-metric",
            &json!({
                "run_id": metric.run_id(),
                "key": metric.key(),
                "value": metric.value(),
                "timestamp": metric.timestamp().timestamp_millis(),
                "step": metric.step(),
            }),
        )?;
        Ok(())
    }

    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: &[u8]) -> Result<ArtifactRecord> {
        let url = self.proxy_url(run.artifact_uri(), path)?;
        let endpoint = "mlflow-artifacts/artifacts";
        let request = self.client.put(url).body(bytes.to_vec());
        self.execute::<serde_json::Value>(endpoint, request)?
            .map_err(|api| api.into_error(endpoint))?;

        debug!(run_id = run.run_id(), path, size = bytes.len(), "uploaded artifact");
        let uri = format!("{}/{path}", run.artifact_uri().trim_end_matches('/'));
        Ok(ArtifactRecord::for_bytes(run.run_id(), path, uri, bytes))
    }

    fn register_model(
        &self,
        run: &RunInfo,
        name: &str,
        source: &str,
    ) -> Result<ModelVersionRecord> {
        let endpoint = "registered-models/create";
        let request = self
            .client
            .post(self.api_url(endpoint))
            .json(&json!({ "name": name }));
        match self.execute::<serde_json::Value>(endpoint, request)? {
            Ok(_) => debug!(name, "created registered model"),
            Err(api) if api.error_code == RESOURCE_ALREADY_EXISTS => {}
            Err(api) => return Err(api.into_error(endpoint)),
        }

        let response: ModelVersionResponse = self.post(
            "model-versions/create",
            &json!({ "name": name, "source": source, "run_id": run.run_id() }),
        )?;
        let version = response.model_version;
        let source = if version.source.is_empty() { source.to_string() } else { version.source };
        let run_id = if version.run_id.is_empty() { run.run_id().to_string() } else { version.run_id };
        Ok(ModelVersionRecord::new(version.name, version.version, source, run_id))
    }

    fn update_run(&self, run: &RunInfo) -> Result<()> {
        let end_time = run.ended_at().map(|t| t.timestamp_millis());
        let _: serde_json::Value = self.post(
            "runs/update",
            &json!({
                "run_id": run.run_id(),
                "status": run.status().as_mlflow_str(),
                "end_time": end_time,
            }),
        )?;
        Ok(())
    }
}
