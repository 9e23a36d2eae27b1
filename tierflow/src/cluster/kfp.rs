//! Kubeflow Pipelines orchestrator over the v2beta1 REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{ClusterOrchestrator, WorkflowDocument, WorkflowParams};
use crate::config::ClusterConfig;
use crate::errors::ClusterError;

const RUNS: &str = "apis/v2beta1/runs";

#[derive(Deserialize)]
struct RunResponse {
    run_id: String,
}

/// Compiles to YAML and submits runs to a Kubeflow Pipelines endpoint.
#[derive(Debug, Clone)]
pub struct KfpOrchestrator {
    client: Client,
    host: String,
    job_name: String,
}

impl KfpOrchestrator {
    /// Creates a client for `config.host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClusterConfig) -> Result<Self, ClusterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClusterError::Submit(e.to_string()))?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            job_name: config.job_name.clone(),
        })
    }
}

#[async_trait]
impl ClusterOrchestrator for KfpOrchestrator {
    fn compile(&self, document: &WorkflowDocument) -> Result<String, ClusterError> {
        serde_yaml::to_string(document).map_err(|e| ClusterError::Compile(e.to_string()))
    }

    async fn submit(&self, package: &str, params: &WorkflowParams) -> Result<String, ClusterError> {
        let spec: serde_json::Value =
            serde_yaml::from_str(package).map_err(|e| ClusterError::Compile(e.to_string()))?;
        let body = json!({
            "display_name": self.job_name,
            "pipeline_spec": spec,
            "runtime_config": { "parameters": params.to_map() },
        });

        let url = format!("{}/{RUNS}", self.host);
        debug!(%url, "Submitting pipeline run");
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClusterError::Submit(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ClusterError::Submit(format!("{status}: {text}")));
        }
        let run: RunResponse = resp
            .json()
            .await
            .map_err(|e| ClusterError::Submit(e.to_string()))?;
        info!(run_id = %run.run_id, "Pipeline run accepted");
        Ok(run.run_id)
    }

    fn monitor_url(&self, run_id: &str) -> String {
        format!("{}/#/runs/details/{run_id}", self.host)
    }
}
