//! MLflow REST backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::OnceCell;
use tracing::info;

use super::TrackingBackend;
use crate::config::TrackingConfig;
use crate::errors::TrackingError;
use crate::utils::epoch_millis;

const API: &str = "api/2.0/mlflow";

#[derive(Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    run: RunBody,
}

#[derive(Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
}

/// Talks to an MLflow tracking server over its REST API.
#[derive(Debug)]
pub struct MlflowBackend {
    client: Client,
    base_url: String,
    experiment_name: String,
    artifact_location: Option<String>,
    experiment_tags: BTreeMap<String, String>,
    experiment_id: OnceCell<String>,
}

impl MlflowBackend {
    /// Creates a client for `config.tracking_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TrackingConfig) -> Result<Self, TrackingError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TrackingError::unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.tracking_uri.trim_end_matches('/').to_string(),
            experiment_name: config.experiment_name.clone(),
            artifact_location: config.artifact_location.clone(),
            experiment_tags: BTreeMap::new(),
            experiment_id: OnceCell::new(),
        })
    }

    /// Tags set on the experiment when it is created.
    #[must_use]
    pub fn with_experiment_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.experiment_tags = tags;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{API}/{endpoint}", self.base_url)
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, TrackingError> {
        let resp = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| TrackingError::unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            resp.json()
                .await
                .map_err(|e| TrackingError::rejected(endpoint, e.to_string()))
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(TrackingError::rejected(endpoint, format!("{status}: {text}")))
        }
    }

    async fn experiment_id(&self) -> Result<&String, TrackingError> {
        self.experiment_id
            .get_or_try_init(|| async {
                let resp = self
                    .client
                    .get(self.url("experiments/get-by-name"))
                    .query(&[("experiment_name", &self.experiment_name)])
                    .send()
                    .await
                    .map_err(|e| TrackingError::unavailable(e.to_string()))?;

                if resp.status().is_success() {
                    let found: ExperimentResponse = resp
                        .json()
                        .await
                        .map_err(|e| TrackingError::rejected("experiments/get-by-name", e.to_string()))?;
                    return Ok(found.experiment.experiment_id);
                }

                let mut body = json!({
                    "name": self.experiment_name,
                    "tags": tag_list(&self.experiment_tags),
                });
                if let Some(location) = &self.artifact_location {
                    body["artifact_location"] = json!(location);
                }
                let created: CreateExperimentResponse =
                    serde_json::from_value(self.post("experiments/create", &body).await?)
                        .map_err(|e| TrackingError::rejected("experiments/create", e.to_string()))?;
                info!(experiment = %self.experiment_name, "Created MLflow experiment");
                Ok(created.experiment_id)
            })
            .await
    }
}

fn tag_list(tags: &BTreeMap<String, String>) -> Vec<Value> {
    tags.iter()
        .map(|(key, value)| json!({"key": key, "value": value}))
        .collect()
}

#[async_trait]
impl TrackingBackend for MlflowBackend {
    async fn start_run(&self, tags: &BTreeMap<String, String>) -> Result<String, TrackingError> {
        let experiment_id = self.experiment_id().await?.clone();
        let body = json!({
            "experiment_id": experiment_id,
            "start_time": epoch_millis(),
            "tags": tag_list(tags),
        });
        let run: RunResponse = serde_json::from_value(self.post("runs/create", &body).await?)
            .map_err(|e| TrackingError::rejected("runs/create", e.to_string()))?;
        Ok(run.run.info.run_id)
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        let body = json!({"run_id": run_id, "key": key, "value": value});
        self.post("runs/log-parameter", &body).await.map(|_| ())
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        let body = json!({
            "run_id": run_id,
            "key": key,
            "value": value,
            "timestamp": epoch_millis(),
            "step": 0,
        });
        self.post("runs/log-metric", &body).await.map(|_| ())
    }

    async fn log_model_artifact(
        &self,
        run_id: &str,
        path: &Path,
        model_name: &str,
    ) -> Result<String, TrackingError> {
        let source = path.display().to_string();
        let tag = json!({"run_id": run_id, "key": "model_artifact_path", "value": source});
        self.post("runs/set-tag", &tag).await?;

        // An existing registered model is fine.
        let _ = self
            .post("registered-models/create", &json!({"name": model_name}))
            .await;
        let version = json!({"name": model_name, "source": source, "run_id": run_id});
        let created = self.post("model-versions/create", &version).await?;
        registered_version(&created)
            .ok_or_else(|| TrackingError::rejected("model-versions/create", "response has no version"))
    }

    async fn end_run(&self, run_id: &str, succeeded: bool) -> Result<(), TrackingError> {
        let body = json!({
            "run_id": run_id,
            "status": if succeeded { "FINISHED" } else { "FAILED" },
            "end_time": epoch_millis(),
        });
        self.post("runs/update", &body).await.map(|_| ())
    }
}

/// The `version` field of a `model-versions/create` response.
fn registered_version(response: &Value) -> Option<String> {
    match &response["model_version"]["version"] {
        Value::String(v) => Some(v.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_version_parsing() {
        let created = json!({"model_version": {"name": "clf", "version": "3"}});
        assert_eq!(registered_version(&created).as_deref(), Some("3"));
        assert_eq!(
            registered_version(&json!({"model_version": {"version": 4}})).as_deref(),
            Some("4")
        );
        assert_eq!(registered_version(&json!({})), None);
    }

    #[test]
    fn test_urls_and_tags() {
        let config = TrackingConfig {
            tracking_uri: "http://mlflow:5000/".to_string(),
            ..TrackingConfig::default()
        };
        let backend = MlflowBackend::new(&config).unwrap();
        assert_eq!(
            backend.url("runs/create"),
            "http://mlflow:5000/api/2.0/mlflow/runs/create"
        );

        let tags = BTreeMap::from([("team".to_string(), "lucid-therapeutics".to_string())]);
        assert_eq!(
            tag_list(&tags),
            vec![json!({"key": "team", "value": "lucid-therapeutics"})]
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let config = TrackingConfig {
            tracking_uri: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 1.0,
            ..TrackingConfig::default()
        };
        let backend = MlflowBackend::new(&config).unwrap();
        let err = backend.start_run(&BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, TrackingError::Unavailable(_)));
    }
}
