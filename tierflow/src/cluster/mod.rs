//! Workflow compilation and cluster submission.
//!
//! Compilation and submission sit behind [`ClusterOrchestrator`]. Without the
//! cluster capability the entry point reports that compilation was skipped;
//! submission failures are reported, never raised.

#[cfg(feature = "cluster")]
mod kfp;
mod workflow;

#[cfg(feature = "cluster")]
pub use kfp::KfpOrchestrator;
pub use workflow::{ParameterSpec, WorkflowDocument, WorkflowMetadata, WorkflowParams, WorkflowStep};

use async_trait::async_trait;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::capabilities::{Capability, CapabilityRegistry};
use crate::config::PipelineConfig;
use crate::errors::ClusterError;

/// Something that can turn the graph into a workflow package and run it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterOrchestrator: Send + Sync {
    /// Serializes the workflow into a package.
    fn compile(&self, document: &WorkflowDocument) -> Result<String, ClusterError>;

    /// Submits a compiled package and returns the run id.
    async fn submit(&self, package: &str, params: &WorkflowParams) -> Result<String, ClusterError>;

    /// Where a submitted run can be watched.
    fn monitor_url(&self, run_id: &str) -> String;
}

/// Builds the orchestrator for `config` when the cluster capability is present.
#[must_use]
pub fn orchestrator_for(
    config: &PipelineConfig,
    registry: &CapabilityRegistry,
) -> Option<Box<dyn ClusterOrchestrator>> {
    if !registry.is_available(Capability::ClusterSdk) {
        return None;
    }
    connect(config)
}

#[cfg(feature = "cluster")]
fn connect(config: &PipelineConfig) -> Option<Box<dyn ClusterOrchestrator>> {
    match KfpOrchestrator::new(&config.cluster) {
        Ok(kfp) => Some(Box::new(kfp)),
        Err(err) => {
            warn!(error = %err, "Failed to set up orchestrator client");
            None
        }
    }
}

#[cfg(not(feature = "cluster"))]
fn connect(_config: &PipelineConfig) -> Option<Box<dyn ClusterOrchestrator>> {
    None
}

/// What the compile entry point did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// No orchestrator available.
    Skipped,
    /// The package was written.
    Compiled {
        /// Package path.
        path: PathBuf,
    },
    /// The package was written and a run accepted.
    Submitted {
        /// Package path.
        path: PathBuf,
        /// Orchestrator run id.
        run_id: String,
        /// Where to watch the run.
        monitor_url: String,
    },
    /// The package was written but submission failed.
    SubmitFailed {
        /// Package path.
        path: PathBuf,
        /// Why.
        error: String,
    },
}

impl fmt::Display for CompileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "Cluster SDK not available - skipping pipeline compilation"),
            Self::Compiled { path } => write!(f, "Pipeline compiled to {}", path.display()),
            Self::Submitted {
                path,
                run_id,
                monitor_url,
            } => {
                writeln!(f, "Pipeline compiled to {}", path.display())?;
                writeln!(f, "Pipeline run submitted: {run_id}")?;
                write!(f, "Monitor at: {monitor_url}")
            }
            Self::SubmitFailed { path, error } => {
                writeln!(f, "Pipeline compiled to {}", path.display())?;
                writeln!(f, "Could not submit pipeline run: {error}")?;
                write!(f, "Make sure Kubeflow Pipelines is accessible")
            }
        }
    }
}

/// Compiles the graph to `output` and, if asked, submits it.
///
/// # Errors
///
/// Returns an error only if compilation or writing the package fails.
pub async fn compile_and_submit(
    orchestrator: Option<&dyn ClusterOrchestrator>,
    config: &PipelineConfig,
    output: &Path,
    submit: bool,
) -> Result<CompileOutcome, ClusterError> {
    let Some(orchestrator) = orchestrator else {
        info!("Cluster SDK not available - skipping pipeline compilation");
        return Ok(CompileOutcome::Skipped);
    };

    let document = WorkflowDocument::compile(config);
    let package = orchestrator.compile(&document)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &package)?;
    info!(path = %output.display(), steps = document.steps.len(), "Pipeline compiled");

    let path = output.to_path_buf();
    if !submit {
        return Ok(CompileOutcome::Compiled { path });
    }

    match orchestrator
        .submit(&package, &WorkflowParams::submission())
        .await
    {
        Ok(run_id) => Ok(CompileOutcome::Submitted {
            monitor_url: orchestrator.monitor_url(&run_id),
            path,
            run_id,
        }),
        Err(err) => {
            warn!(error = %err, "Pipeline submission failed");
            let error = match err {
                ClusterError::Submit(reason) => reason,
                other => other.to_string(),
            };
            Ok(CompileOutcome::SubmitFailed { path, error })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;
    use tempfile::tempdir;

    fn mock() -> MockClusterOrchestrator {
        let mut mock = MockClusterOrchestrator::new();
        mock.expect_compile()
            .returning(|doc| Ok(format!("steps: {}", doc.steps.len())));
        mock.expect_monitor_url()
            .returning(|id| format!("http://kfp/#/runs/details/{id}"));
        mock
    }

    #[tokio::test]
    async fn test_skipped_without_orchestrator() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("pipeline.yaml");
        let outcome = compile_and_submit(None, &PipelineConfig::default(), &out, true)
            .await
            .unwrap();
        assert_eq!(outcome, CompileOutcome::Skipped);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_compile_writes_package() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested/pipeline.yaml");
        let mut mock = mock();
        mock.expect_submit().never();

        let outcome = compile_and_submit(Some(&mock), &PipelineConfig::default(), &out, false)
            .await
            .unwrap();
        assert_eq!(outcome, CompileOutcome::Compiled { path: out.clone() });
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "steps: 4");
    }

    #[tokio::test]
    async fn test_submit_uses_submission_params() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("pipeline.yaml");
        let mut mock = mock();
        mock.expect_submit()
            .withf(|package, params| {
                package.to_string() == "steps: 4" && params.n_estimators == 150
            })
            .times(1)
            .returning(|_, _| Ok("run-7".to_string()));

        let outcome = compile_and_submit(Some(&mock), &PipelineConfig::default(), &out, true)
            .await
            .unwrap();
        let text = outcome.to_string();
        assert!(text.contains("Pipeline run submitted: run-7"));
        assert!(text.contains("Monitor at: http://kfp/#/runs/details/run-7"));
    }

    #[tokio::test]
    async fn test_submit_failure_is_reported() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("pipeline.yaml");
        let mut mock = mock();
        mock.expect_submit()
            .with(always(), always())
            .returning(|_, _| Err(ClusterError::Submit("connection refused".to_string())));

        let outcome = compile_and_submit(Some(&mock), &PipelineConfig::default(), &out, true)
            .await
            .unwrap();
        assert!(matches!(outcome, CompileOutcome::SubmitFailed { .. }));
        let text = outcome.to_string();
        assert!(text.contains("Could not submit pipeline run: connection refused"));
        assert!(text.contains("Make sure Kubeflow Pipelines is accessible"));
        assert!(out.exists());
    }

    #[test]
    fn test_orchestrator_gated_on_capability() {
        let registry = CapabilityRegistry::without(&[Capability::ClusterSdk]);
        assert!(orchestrator_for(&PipelineConfig::default(), &registry).is_none());
    }
}
