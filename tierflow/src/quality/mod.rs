//! Advisory data-quality checks.
//!
//! The gate never fails a step. Its report is attached to the step's outcome
//! and to the run manifest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use tracing::{info, warn};

use crate::capabilities::{Capability, CapabilityRegistry};
use crate::frame::DataFrame;
use crate::observability::run_step_blocking;

/// Datasets with fewer rows than this get a low-sample-count issue.
pub const MIN_ROWS: usize = 100;

/// Outcome of a quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    /// No issues.
    Passed,
    /// At least one issue.
    Warning,
    /// The check did not run.
    Skipped,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Warning => write!(f, "warning"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Summary statistics and issues for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// What was checked, e.g. `"Preprocessing Output - train"`.
    pub context: String,
    /// Number of rows.
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
    /// Total missing cells.
    pub missing_value_count: usize,
    /// Rows identical to an earlier row.
    pub duplicate_row_count: usize,
    /// Approximate memory footprint.
    pub memory_bytes: usize,
    /// Numeric column names.
    pub numeric_columns: BTreeSet<String>,
    /// Text column names.
    pub categorical_columns: BTreeSet<String>,
    /// Issues in priority order.
    pub issues: Vec<String>,
    /// Overall status.
    pub status: QualityStatus,
    /// Why the check was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QualityReport {
    /// A report for a check that did not run.
    #[must_use]
    pub fn skipped(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            row_count: 0,
            column_count: 0,
            missing_value_count: 0,
            duplicate_row_count: 0,
            memory_bytes: 0,
            numeric_columns: BTreeSet::new(),
            categorical_columns: BTreeSet::new(),
            issues: Vec::new(),
            status: QualityStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    /// Computes the report for `frame`.
    #[must_use]
    pub fn inspect(context: impl Into<String>, frame: &DataFrame) -> Self {
        let row_count = frame.n_rows();
        let missing_value_count = frame.missing_count();
        let duplicate_row_count = frame.duplicate_row_count();

        let mut issues = Vec::new();
        if missing_value_count > 0 {
            issues.push(format!("Missing values: {missing_value_count}"));
        }
        if duplicate_row_count > 0 {
            issues.push(format!("Duplicate rows: {duplicate_row_count}"));
        }
        if row_count < MIN_ROWS {
            issues.push(format!("Low sample count: {row_count}"));
        }

        let status = if issues.is_empty() {
            QualityStatus::Passed
        } else {
            QualityStatus::Warning
        };

        Self {
            context: context.into(),
            row_count,
            column_count: frame.n_cols(),
            missing_value_count,
            duplicate_row_count,
            memory_bytes: frame.memory_bytes(),
            numeric_columns: frame.numeric_columns().into_iter().collect(),
            categorical_columns: frame.text_columns().into_iter().collect(),
            issues,
            status,
            reason: None,
        }
    }

    /// Returns true when the status is `passed`.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == QualityStatus::Passed
    }
}

/// Runs quality checks when the tabular engine is available.
#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    enabled: bool,
}

impl QualityGate {
    /// A gate that is active iff the registry has the tabular engine.
    #[must_use]
    pub fn new(registry: &CapabilityRegistry) -> Self {
        Self {
            enabled: registry.is_available(Capability::TabularEngine),
        }
    }

    /// A gate that always checks.
    #[must_use]
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    /// Validates `frame`. `None` stands for a placeholder artifact.
    #[must_use]
    pub fn validate(&self, frame: Option<&DataFrame>, context: &str) -> QualityReport {
        let scope = format!("{context} - Data Quality Validation");
        let result: Result<QualityReport, Infallible> = run_step_blocking(&scope, || {
            Ok(match (self.enabled, frame) {
                (false, _) => QualityReport::skipped(context, "tabular engine not available"),
                (true, None) => QualityReport::skipped(context, "placeholder artifact"),
                (true, Some(frame)) => QualityReport::inspect(context, frame),
            })
        });
        let report = match result {
            Ok(report) => report,
            Err(never) => match never {},
        };

        info!(context, status = %report.status, "Data quality check - Status: {}", report.status);
        if !report.issues.is_empty() {
            warn!(context, issues = ?report.issues, "Data quality issues: {}", report.issues.join(", "));
        }
        report
    }
}
