//! Error types for tierflow.
//!
//! The taxonomy follows how failures are treated by the pipeline:
//!
//! - capability absence is never an error (it selects the degraded tier),
//! - data-contract violations abort the current step and the run,
//! - tracking and cluster failures are isolated at their adapters and only
//!   surface as [`TrackingError`] / [`ClusterError`] values that callers log.

use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::StepId;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step's input did not satisfy its data contract.
    #[error("{0}")]
    DataContract(#[from] DataContractError),

    /// Configuration could not be resolved or failed validation.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A step was started out of order.
    #[error("Invalid state transition: cannot run '{step}' from state '{from}'")]
    InvalidTransition {
        /// The step that was attempted.
        step: StepId,
        /// The state the pipeline was in.
        from: String,
    },

    /// An artifact could not be written or read.
    #[error("Artifact I/O error at {}: {source}", path.display())]
    ArtifactIo {
        /// The artifact path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Wraps an I/O failure with the artifact path it happened on.
    pub fn artifact_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns a stable code for diagnostics.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataContract(err) => err.code(),
            Self::Config(_) => "PIPELINE-CONFIG",
            Self::InvalidTransition { .. } => "PIPELINE-TRANSITION",
            Self::ArtifactIo { .. } => "PIPELINE-ARTIFACT-IO",
            Self::Serialization(_) => "PIPELINE-SERIALIZATION",
            Self::Io(_) => "PIPELINE-IO",
        }
    }

    /// Returns true if the error is a data-contract violation.
    #[must_use]
    pub fn is_data_contract(&self) -> bool {
        matches!(self, Self::DataContract(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), json!(self.code()));
        map.insert("message".to_string(), json!(self.to_string()));
        if let Self::DataContract(err) = self {
            if let Some(ref path) = err.path {
                map.insert("path".to_string(), json!(path.display().to_string()));
            }
        }
        map
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// The kind of data-contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// A required column is absent.
    MissingColumn,
    /// A file could not be parsed in its declared format.
    MalformedArtifact,
    /// A column that must be numeric holds non-numeric or missing data.
    NonNumeric,
    /// The dataset is too small for the requested operation.
    InsufficientData,
}

/// Error raised when a step input violates its contract.
#[derive(Debug, Clone, Error)]
#[error("Data contract violation: {message}")]
pub struct DataContractError {
    /// The kind of violation.
    pub kind: ContractViolation,
    /// Human-readable detail.
    pub message: String,
    /// The artifact involved, if known.
    pub path: Option<PathBuf>,
}

impl DataContractError {
    /// Creates a new data-contract error.
    #[must_use]
    pub fn new(kind: ContractViolation, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    /// Creates a missing-column error.
    #[must_use]
    pub fn missing_column(column: &str) -> Self {
        Self::new(
            ContractViolation::MissingColumn,
            format!("Target column '{column}' not found in dataset"),
        )
    }

    /// Creates a malformed-artifact error.
    #[must_use]
    pub fn malformed(path: impl AsRef<Path>, reason: impl std::fmt::Display) -> Self {
        let path = path.as_ref();
        Self::new(
            ContractViolation::MalformedArtifact,
            format!("Failed to load {}: {reason}", path.display()),
        )
        .with_path(path)
    }

    /// Sets the artifact path.
    #[must_use]
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Returns the stable code for this violation.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.kind {
            ContractViolation::MissingColumn => "CONTRACT-MISSING-COLUMN",
            ContractViolation::MalformedArtifact => "CONTRACT-MALFORMED",
            ContractViolation::NonNumeric => "CONTRACT-NON-NUMERIC",
            ContractViolation::InsufficientData => "CONTRACT-INSUFFICIENT-DATA",
        }
    }
}

/// Errors raised while resolving [`crate::config::PipelineConfig`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        /// The variable name.
        key: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The resolved configuration violates an invariant.
    #[error("Invalid configuration: {0}")]
    Invariant(String),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the experiment-tracking side-channel.
///
/// These never propagate out of [`crate::tracking::TrackingAdapter`].
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    /// The service could not be reached.
    #[error("Tracking service unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured timeout.
    #[error("Tracking call '{operation}' timed out after {timeout_seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout in seconds.
        timeout_seconds: f64,
    },

    /// The service answered with an error.
    #[error("Tracking service rejected '{operation}': {message}")]
    Rejected {
        /// The operation.
        operation: String,
        /// The service message.
        message: String,
    },
}

impl TrackingError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Creates a rejected error.
    #[must_use]
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Errors from compiling or submitting to a cluster orchestrator.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The workflow document could not be produced.
    #[error("Pipeline compilation failed: {0}")]
    Compile(String),

    /// The orchestrator endpoint could not be reached or refused the run.
    #[error("Could not submit pipeline run: {0}")]
    Submit(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message() {
        let err = DataContractError::missing_column("therapy_category");
        assert_eq!(err.kind, ContractViolation::MissingColumn);
        assert!(err.to_string().contains("'therapy_category' not found"));
        assert_eq!(err.code(), "CONTRACT-MISSING-COLUMN");
    }

    #[test]
    fn test_pipeline_error_is_data_contract() {
        let err: PipelineError = DataContractError::malformed("raw.csv", "bad header").into();
        assert!(err.is_data_contract());
        assert_eq!(err.code(), "CONTRACT-MALFORMED");

        let dict = err.to_dict();
        assert_eq!(dict.get("path").unwrap(), "raw.csv");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = PipelineError::InvalidTransition {
            step: StepId::Train,
            from: "generated".to_string(),
        };
        assert!(err.to_string().contains("cannot run 'train' from state 'generated'"));
        assert!(!err.is_data_contract());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid_value("TEST_SIZE", "abc", "not a number");
        assert_eq!(
            err.to_string(),
            "Invalid value for TEST_SIZE: 'abc' (not a number)"
        );
    }

    #[test]
    fn test_tracking_error_display() {
        let err = TrackingError::Timeout {
            operation: "log_metric".to_string(),
            timeout_seconds: 5.0,
        };
        assert!(err.to_string().contains("timed out after 5s"));
    }
}
