//! Experiment-tracking side-channel.
//!
//! [`TrackingAdapter`] is the only thing steps talk to. It mirrors locally
//! computed parameters and metrics to a [`TrackingBackend`] when one is
//! configured, bounds every call by a timeout, and turns every failure into a
//! logged warning. Nothing here can fail a step.

#[cfg(feature = "tracking")]
mod mlflow;

#[cfg(feature = "tracking")]
pub use mlflow::MlflowBackend;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capabilities::{Capability, CapabilityRegistry};
use crate::config::PipelineConfig;
use crate::errors::TrackingError;

/// A remote experiment-tracking service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    /// Opens a run tagged with `tags` and returns the remote run id.
    async fn start_run(&self, tags: &BTreeMap<String, String>) -> Result<String, TrackingError>;

    /// Records a parameter.
    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError>;

    /// Records a metric.
    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError>;

    /// Points the run at a persisted model, registers it under `model_name`
    /// and returns the registered version.
    async fn log_model_artifact(
        &self,
        run_id: &str,
        path: &Path,
        model_name: &str,
    ) -> Result<String, TrackingError>;

    /// Closes the run.
    async fn end_run(&self, run_id: &str, succeeded: bool) -> Result<(), TrackingError>;
}

/// A run as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunHandle {
    /// No tracking: every call on this handle does nothing.
    #[default]
    Detached,
    /// A run open on the backend.
    Active {
        /// The backend's run id.
        remote_id: String,
    },
}

impl RunHandle {
    /// Returns true if calls on this handle reach a backend.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// The backend's run id, if any.
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Active { remote_id } => Some(remote_id),
            Self::Detached => None,
        }
    }
}

/// Best-effort mirror of local results to a tracking backend.
#[derive(Clone)]
pub struct TrackingAdapter {
    backend: Option<Arc<dyn TrackingBackend>>,
    timeout: Duration,
}

impl std::fmt::Debug for TrackingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingAdapter")
            .field("enabled", &self.is_enabled())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for TrackingAdapter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TrackingAdapter {
    /// An adapter that does nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// An adapter forwarding to `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn TrackingBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
        }
    }

    /// Builds the MLflow-backed adapter when the tracking capability is
    /// available, and a disabled one otherwise.
    #[must_use]
    pub fn from_config(config: &PipelineConfig, registry: &CapabilityRegistry) -> Self {
        if !registry.is_available(Capability::TrackingService) {
            info!("Experiment tracking disabled");
            return Self::disabled();
        }
        Self::connect(config)
    }

    #[cfg(feature = "tracking")]
    fn connect(config: &PipelineConfig) -> Self {
        let tracking = &config.tracking;
        match MlflowBackend::new(tracking) {
            Ok(backend) => {
                info!(uri = %tracking.tracking_uri, "MLflow tracking URI: {}", tracking.tracking_uri);
                let backend = backend.with_experiment_tags(config.tracking_tags());
                Self::new(Arc::new(backend), tracking.timeout())
            }
            Err(err) => {
                warn!(error = %err, "Failed to set up tracking client");
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "tracking"))]
    fn connect(_config: &PipelineConfig) -> Self {
        Self::disabled()
    }

    /// Returns true if a backend is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Opens a run; returns [`RunHandle::Detached`] when disabled or failing.
    pub async fn start_run(&self, tags: &BTreeMap<String, String>) -> RunHandle {
        let Some(backend) = &self.backend else {
            return RunHandle::Detached;
        };
        match self.guard("start_run", backend.start_run(tags)).await {
            Some(remote_id) => {
                debug!(%remote_id, "Tracking run started");
                RunHandle::Active { remote_id }
            }
            None => RunHandle::Detached,
        }
    }

    /// Mirrors a parameter.
    pub async fn log_param(&self, handle: &RunHandle, key: &str, value: impl Display + Send) {
        if let Some((backend, run_id)) = self.target(handle) {
            let value = value.to_string();
            self.guard("log_param", backend.log_param(run_id, key, &value))
                .await;
        }
    }

    /// Mirrors a metric.
    pub async fn log_metric(&self, handle: &RunHandle, key: &str, value: f64) {
        if let Some((backend, run_id)) = self.target(handle) {
            self.guard("log_metric", backend.log_metric(run_id, key, value))
                .await;
        }
    }

    /// Mirrors a persisted model; returns the registered version on success.
    pub async fn log_model_artifact(
        &self,
        handle: &RunHandle,
        path: &Path,
        model_name: &str,
    ) -> Option<String> {
        let (backend, run_id) = self.target(handle)?;
        let version = self
            .guard(
                "log_model_artifact",
                backend.log_model_artifact(run_id, path, model_name),
            )
            .await?;
        info!(model_name, %version, "Registered model version {version}");
        Some(version)
    }

    /// Closes the run.
    pub async fn end_run(&self, handle: &RunHandle, succeeded: bool) {
        if let Some((backend, run_id)) = self.target(handle) {
            self.guard("end_run", backend.end_run(run_id, succeeded))
                .await;
        }
    }

    fn target<'a>(&'a self, handle: &'a RunHandle) -> Option<(&'a Arc<dyn TrackingBackend>, &'a str)> {
        Some((self.backend.as_ref()?, handle.remote_id()?))
    }

    async fn guard<T, F>(&self, operation: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, TrackingError>> + Send,
    {
        let err = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => err,
            Err(_) => TrackingError::Timeout {
                operation: operation.to_string(),
                timeout_seconds: self.timeout.as_secs_f64(),
            },
        };
        warn!(operation, error = %err, "Tracking call failed, continuing with local artifacts");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn adapter(mock: MockTrackingBackend) -> TrackingAdapter {
        TrackingAdapter::new(Arc::new(mock), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_disabled_adapter_is_detached() {
        let adapter = TrackingAdapter::disabled();
        let handle = adapter.start_run(&BTreeMap::new()).await;
        assert_eq!(handle, RunHandle::Detached);
        adapter.log_metric(&handle, "train_accuracy", 0.9).await;
        adapter.end_run(&handle, true).await;
    }

    #[tokio::test]
    async fn test_mirrors_under_the_same_handle() {
        let mut mock = MockTrackingBackend::new();
        mock.expect_start_run()
            .times(1)
            .returning(|_| Ok("remote-1".to_string()));
        mock.expect_log_param()
            .with(eq("remote-1"), eq("n_estimators"), eq("100"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_log_metric()
            .with(eq("remote-1"), eq("train_accuracy"), eq(0.5))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let adapter = adapter(mock);
        let handle = adapter.start_run(&BTreeMap::new()).await;
        assert_eq!(handle.remote_id(), Some("remote-1"));
        adapter.log_param(&handle, "n_estimators", 100).await;
        adapter.log_metric(&handle, "train_accuracy", 0.5).await;
    }

    #[tokio::test]
    async fn test_start_failure_detaches() {
        let mut mock = MockTrackingBackend::new();
        mock.expect_start_run()
            .returning(|_| Err(TrackingError::unavailable("connection refused")));
        mock.expect_log_metric().never();

        let adapter = adapter(mock);
        let handle = adapter.start_run(&BTreeMap::new()).await;
        assert!(!handle.is_active());
        adapter.log_metric(&handle, "train_accuracy", 0.5).await;
    }

    #[tokio::test]
    async fn test_model_artifact_returns_registered_version() {
        let mut mock = MockTrackingBackend::new();
        mock.expect_log_model_artifact()
            .withf(|run_id, _, model_name| run_id.to_string() == "r" && model_name.to_string() == "clf")
            .times(1)
            .returning(|_, _, _| Ok("7".to_string()));

        let handle = RunHandle::Active {
            remote_id: "r".to_string(),
        };
        let version = adapter(mock)
            .log_model_artifact(&handle, Path::new("models/model.bin"), "clf")
            .await;
        assert_eq!(version.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_model_artifact_failure_has_no_version() {
        let mut mock = MockTrackingBackend::new();
        mock.expect_log_model_artifact()
            .returning(|_, _, _| Err(TrackingError::unavailable("down")));

        let handle = RunHandle::Active {
            remote_id: "r".to_string(),
        };
        let adapter = adapter(mock);
        let model = Path::new("m.bin");
        assert_eq!(adapter.log_model_artifact(&handle, model, "clf").await, None);
        assert_eq!(
            adapter.log_model_artifact(&RunHandle::Detached, model, "clf").await,
            None
        );
    }

    #[tokio::test]
    async fn test_log_failure_is_swallowed() {
        let mut mock = MockTrackingBackend::new();
        mock.expect_log_metric()
            .returning(|_, _, _| Err(TrackingError::rejected("log_metric", "bad request")));

        let handle = RunHandle::Active {
            remote_id: "r".to_string(),
        };
        adapter(mock).log_metric(&handle, "x", 1.0).await;
    }
}
