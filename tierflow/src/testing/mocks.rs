//! Tracking backends and emitters for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capabilities::ExecutionTier;
use crate::core::StepId;
use crate::errors::TrackingError;
use crate::observability::StepEmitter;
use crate::tracking::TrackingBackend;

/// One call received by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingCall {
    /// `start_run`.
    StartRun(BTreeMap<String, String>),
    /// `log_param`.
    Param {
        /// Run id.
        run_id: String,
        /// Parameter name.
        key: String,
        /// Parameter value.
        value: String,
    },
    /// `log_metric`.
    Metric {
        /// Run id.
        run_id: String,
        /// Metric name.
        key: String,
        /// Metric value.
        value: f64,
    },
    /// `log_model_artifact`.
    ModelArtifact {
        /// Run id.
        run_id: String,
        /// Model path.
        path: PathBuf,
        /// Registered model name.
        model_name: String,
    },
    /// `end_run`.
    EndRun {
        /// Run id.
        run_id: String,
        /// Whether the run succeeded.
        succeeded: bool,
    },
}

/// A backend that accepts everything and records each call.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<TrackingCall>>,
    runs: Mutex<usize>,
    versions: Mutex<usize>,
}

impl RecordingBackend {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TrackingCall> {
        self.calls.lock().clone()
    }

    /// Metrics logged under `key`.
    #[must_use]
    pub fn metric(&self, key: &str) -> Vec<f64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TrackingCall::Metric { key: k, value, .. } if k == key => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// The last value logged for parameter `key`.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            TrackingCall::Param { key: k, value, .. } if k == key => Some(value.clone()),
            _ => None,
        })
    }

    /// Models registered through `log_model_artifact`.
    #[must_use]
    pub fn model_artifacts(&self) -> Vec<TrackingCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, TrackingCall::ModelArtifact { .. }))
            .cloned()
            .collect()
    }

    /// Number of runs opened.
    #[must_use]
    pub fn run_count(&self) -> usize {
        *self.runs.lock()
    }

    fn push(&self, call: TrackingCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl TrackingBackend for RecordingBackend {
    async fn start_run(&self, tags: &BTreeMap<String, String>) -> Result<String, TrackingError> {
        let id = {
            let mut runs = self.runs.lock();
            *runs += 1;
            format!("run-{}", *runs)
        };
        self.push(TrackingCall::StartRun(tags.clone()));
        Ok(id)
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.push(TrackingCall::Param {
            run_id: run_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        self.push(TrackingCall::Metric {
            run_id: run_id.to_string(),
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn log_model_artifact(
        &self,
        run_id: &str,
        path: &Path,
        model_name: &str,
    ) -> Result<String, TrackingError> {
        let version = {
            let mut versions = self.versions.lock();
            *versions += 1;
            versions.to_string()
        };
        self.push(TrackingCall::ModelArtifact {
            run_id: run_id.to_string(),
            path: path.to_path_buf(),
            model_name: model_name.to_string(),
        });
        Ok(version)
    }

    async fn end_run(&self, run_id: &str, succeeded: bool) -> Result<(), TrackingError> {
        self.push(TrackingCall::EndRun {
            run_id: run_id.to_string(),
            succeeded,
        });
        Ok(())
    }
}

/// A backend whose every call fails, optionally after hanging.
#[derive(Debug, Clone, Default)]
pub struct UnavailableBackend {
    delay: Option<Duration>,
}

impl UnavailableBackend {
    /// Fails immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before failing, to exercise adapter timeouts.
    #[must_use]
    pub fn hanging(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    async fn fail<T>(&self) -> Result<T, TrackingError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(TrackingError::unavailable("connection refused"))
    }
}

#[async_trait]
impl TrackingBackend for UnavailableBackend {
    async fn start_run(&self, _tags: &BTreeMap<String, String>) -> Result<String, TrackingError> {
        self.fail().await
    }

    async fn log_param(&self, _run_id: &str, _key: &str, _value: &str) -> Result<(), TrackingError> {
        self.fail().await
    }

    async fn log_metric(&self, _run_id: &str, _key: &str, _value: f64) -> Result<(), TrackingError> {
        self.fail().await
    }

    async fn log_model_artifact(
        &self,
        _run_id: &str,
        _path: &Path,
        _model_name: &str,
    ) -> Result<String, TrackingError> {
        self.fail().await
    }

    async fn end_run(&self, _run_id: &str, _succeeded: bool) -> Result<(), TrackingError> {
        self.fail().await
    }
}

/// A lifecycle event seen by a [`RecordingEmitter`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// `step_started`.
    Started(StepId, ExecutionTier),
    /// `step_completed`.
    Completed(StepId, ExecutionTier),
    /// `step_failed`, with the error text.
    Failed(StepId, ExecutionTier, String),
}

/// An emitter that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<StepEvent>>,
}

impl RecordingEmitter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().clone()
    }
}

impl StepEmitter for RecordingEmitter {
    fn step_started(&self, step: StepId, tier: ExecutionTier) {
        self.events.lock().push(StepEvent::Started(step, tier));
    }

    fn step_completed(&self, step: StepId, tier: ExecutionTier, _duration_ms: f64) {
        self.events.lock().push(StepEvent::Completed(step, tier));
    }

    fn step_failed(&self, step: StepId, tier: ExecutionTier, _duration_ms: f64, error: &str) {
        self.events
            .lock()
            .push(StepEvent::Failed(step, tier, error.to_string()));
    }
}
