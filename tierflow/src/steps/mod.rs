//! The four pipeline steps.
//!
//! Each step receives its [`ExecutionTier`] at entry and branches once: the
//! full tier runs the real computation, the degraded tier writes placeholders
//! honouring the same artifact contract. Steps never probe for capabilities.

mod evaluate;
mod generate;
mod preprocess;
mod train;

pub use evaluate::{EvaluateStep, EvaluationReport, EvaluationResult};
pub use generate::{DatasetShape, GenerateStep, FEATURE_RANGES};
pub use preprocess::{PreprocessStep, SplitSizes, DEGRADED_SPLIT_SIZES};
pub use train::{TrainStep, TrainingMetrics, TrainingResult};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::capabilities::ExecutionTier;
use crate::config::PipelineConfig;
use crate::core::{ArtifactLayout, ArtifactRecord, RunMetadata, StepId};
use crate::errors::{ContractViolation, DataContractError, PipelineError};
use crate::frame::{Column, DataFrame};
use crate::quality::QualityReport;
use crate::store::ArtifactStore;
use crate::tracking::TrackingAdapter;

/// Column holding the encoded class label.
pub const TARGET_COLUMN: &str = "therapy_category_encoded";

/// Column holding the class name.
pub const CATEGORY_COLUMN: &str = "therapy_category";

/// Everything a step may touch.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Resolved configuration.
    pub config: Arc<PipelineConfig>,
    /// Artifact paths for this run.
    pub layout: ArtifactLayout,
    /// Artifact persistence.
    pub store: ArtifactStore,
    /// Tracking mirror.
    pub tracking: TrackingAdapter,
    /// Metadata shared by every artifact of the run.
    pub metadata: RunMetadata,
}

impl StepContext {
    /// Run metadata merged with step-specific fields, for embedding in artifacts.
    #[must_use]
    pub fn artifact_metadata(&self, extra: serde_json::Value) -> serde_json::Value {
        let mut value = self.metadata.to_json();
        if let (Some(base), serde_json::Value::Object(extra)) = (value.as_object_mut(), extra) {
            base.extend(extra);
        }
        value
    }

    /// Tags for a tracking run opened by `step`.
    #[must_use]
    pub fn tracking_tags(&self, step: StepId) -> BTreeMap<String, String> {
        let mut tags = self.metadata.tags.clone();
        tags.insert("pipeline_name".to_string(), self.metadata.pipeline_name.clone());
        tags.insert("pipeline_version".to_string(), self.metadata.pipeline_version.clone());
        tags.insert("local_run_id".to_string(), self.metadata.run_id.to_string());
        tags.insert("step".to_string(), step.as_str().to_string());
        tags
    }
}

/// What a step hands back to the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome<T> {
    /// The step's return value.
    pub value: T,
    /// The tier it ran in.
    pub tier: ExecutionTier,
    /// Everything it wrote.
    pub artifacts: Vec<ArtifactRecord>,
    /// Quality reports for tabular inputs and outputs.
    pub quality: Vec<QualityReport>,
}

impl<T> StepOutcome<T> {
    /// An outcome with no artifacts yet.
    #[must_use]
    pub fn new(value: T, tier: ExecutionTier) -> Self {
        Self {
            value,
            tier,
            artifacts: Vec::new(),
            quality: Vec::new(),
        }
    }

    /// Adds an artifact record.
    #[must_use]
    pub fn with_artifact(mut self, record: ArtifactRecord) -> Self {
        self.artifacts.push(record);
        self
    }

    /// Adds artifact records.
    #[must_use]
    pub fn with_artifacts(mut self, records: impl IntoIterator<Item = ArtifactRecord>) -> Self {
        self.artifacts.extend(records);
        self
    }

    /// Adds quality reports.
    #[must_use]
    pub fn with_quality(mut self, reports: impl IntoIterator<Item = QualityReport>) -> Self {
        self.quality.extend(reports);
        self
    }
}

/// One node of the pipeline graph.
#[async_trait]
pub trait PipelineStep: Send + Sync + Debug {
    /// What the step returns.
    type Output: Serialize + Send + Debug;

    /// Which step this is.
    fn id(&self) -> StepId;

    /// Runs the step in `tier`.
    async fn execute(
        &self,
        ctx: &StepContext,
        tier: ExecutionTier,
    ) -> Result<StepOutcome<Self::Output>, PipelineError>;
}

/// Reads integer class labels from `column`.
pub(crate) fn labels_from(frame: &DataFrame, column: &str) -> Result<Vec<usize>, DataContractError> {
    let Some(Column::Numeric(values)) = frame.column(column) else {
        return Err(if frame.has_column(column) {
            DataContractError::new(
                ContractViolation::NonNumeric,
                format!("Target column '{column}' is not numeric"),
            )
        } else {
            DataContractError::missing_column(column)
        });
    };

    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(v) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as usize),
            _ => Err(DataContractError::new(
                ContractViolation::NonNumeric,
                format!("Target column '{column}' has an invalid label at row {row}"),
            )),
        })
        .collect()
}

/// Numeric columns other than `target`, in frame order.
pub(crate) fn feature_columns(frame: &DataFrame, target: &str) -> Vec<String> {
    frame
        .numeric_columns()
        .into_iter()
        .filter(|name| name != target)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityGate;
    use crate::tracking::TrackingAdapter;

    fn ctx() -> StepContext {
        let config = PipelineConfig::default();
        StepContext {
            layout: ArtifactLayout::under("out"),
            store: ArtifactStore::new(QualityGate::enabled()),
            tracking: TrackingAdapter::disabled(),
            metadata: config.run_metadata(),
            config: Arc::new(config),
        }
    }

    #[test]
    fn test_artifact_metadata_merges() {
        let ctx = ctx();
        let meta = ctx.artifact_metadata(serde_json::json!({"feature_count": 13}));
        assert_eq!(meta["feature_count"], 13);
        assert_eq!(meta["pipeline_version"], ctx.metadata.pipeline_version.as_str());
        assert_eq!(meta["run_id"], ctx.metadata.run_id.to_string());
    }

    #[test]
    fn test_tracking_tags() {
        let tags = ctx().tracking_tags(StepId::Train);
        assert_eq!(tags["step"], "train");
        assert_eq!(tags["team"], "lucid-therapeutics");
    }

    #[test]
    fn test_labels_from() {
        let frame = DataFrame::from_columns([
            ("y".to_string(), Column::numeric([0.0, 2.0, 1.0])),
            ("bad".to_string(), Column::numeric([0.5, 1.0, 1.0])),
            ("name".to_string(), Column::text(["a", "b", "c"])),
        ])
        .unwrap();

        assert_eq!(labels_from(&frame, "y").unwrap(), vec![0, 2, 1]);
        assert_eq!(labels_from(&frame, "bad").unwrap_err().kind, ContractViolation::NonNumeric);
        assert_eq!(labels_from(&frame, "name").unwrap_err().kind, ContractViolation::NonNumeric);
        assert_eq!(labels_from(&frame, "none").unwrap_err().kind, ContractViolation::MissingColumn);
        assert_eq!(feature_columns(&frame, "y"), vec!["bad".to_string()]);
    }
}
