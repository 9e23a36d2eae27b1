//! # Tierflow
//!
//! A capability-aware four-step machine-learning pipeline: generate,
//! preprocess, train, evaluate.
//!
//! Tierflow provides:
//!
//! - **Capability detection**: one process-wide snapshot of optional subsystems
//! - **Execution tiers**: each step runs its full computation or a degraded
//!   placeholder path with the same artifact contract
//! - **Quality gate**: advisory checks after every tabular write
//! - **Artifact store**: path-addressed datasets, transformers, models and metrics
//! - **Tracking mirror**: best-effort MLflow logging that never fails a run
//! - **Cluster entry point**: workflow compilation and Kubeflow submission
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tierflow::prelude::*;
//!
//! let config = PipelineConfig::from_env()?;
//! let registry = CapabilityRegistry::detect(&config.disabled_capabilities);
//! let summary = PipelineGraph::new(config, registry)?.execute().await?;
//! println!("{}", summary.state);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod capabilities;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod core;
pub mod errors;
pub mod frame;
pub mod ml;
pub mod observability;
pub mod pipeline;
pub mod quality;
pub mod steps;
pub mod store;
pub mod testing;
pub mod tracking;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::capabilities::{
        Capability, CapabilityRecord, CapabilityRegistry, ExecutionTier, TierSelector,
    };
    pub use crate::cluster::{compile_and_submit, ClusterOrchestrator, CompileOutcome, WorkflowDocument};
    pub use crate::config::PipelineConfig;
    pub use crate::core::{
        ArtifactKind, ArtifactLayout, ArtifactRecord, PipelineState, RunMetadata, SplitRole, StepId,
    };
    pub use crate::errors::{ClusterError, ConfigError, DataContractError, PipelineError, TrackingError};
    pub use crate::frame::{Column, DataFrame};
    pub use crate::observability::{run_step, LoggingStepEmitter, StepEmitter, StepScope};
    pub use crate::pipeline::{PipelineGraph, RunSummary, StepReport};
    pub use crate::quality::{QualityGate, QualityReport, QualityStatus};
    pub use crate::steps::{PipelineStep, StepContext, StepOutcome};
    pub use crate::store::{ArtifactStore, Envelope};
    pub use crate::tracking::{RunHandle, TrackingAdapter, TrackingBackend};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
