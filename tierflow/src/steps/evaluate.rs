//! Held-out evaluation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{labels_from, PipelineStep, StepContext, StepOutcome, TARGET_COLUMN};
use crate::capabilities::ExecutionTier;
use crate::core::{ArtifactKind, StepId};
use crate::errors::{DataContractError, PipelineError};
use crate::ml::{classification_report, weighted_precision, ClassificationReport, RandomForest};

/// What evaluation returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Accuracy on the test split.
    pub accuracy: f64,
    /// Weighted precision on the test split.
    pub precision: f64,
}

/// Contents of the evaluation report file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Accuracy on the test split.
    pub accuracy: f64,
    /// Weighted precision on the test split.
    pub precision: f64,
    /// Local run id.
    pub run_id: String,
    /// Per-class metrics; absent for placeholders.
    pub classification_report: Option<ClassificationReport>,
    /// Set when written by the degraded tier.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mock: bool,
}

/// Scores the trained model on the test split.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateStep;

impl EvaluateStep {
    fn full(&self, ctx: &StepContext) -> Result<StepOutcome<EvaluationResult>, PipelineError> {
        let path = &ctx.layout.test_data;
        let frame = ctx.store.read_tabular(path)?;
        let envelope = ctx
            .store
            .read_envelope::<RandomForest>(&ctx.layout.model, ArtifactKind::TrainedModel)?;

        if let Some(missing) = envelope.feature_names.iter().find(|name| !frame.has_column(name)) {
            return Err(DataContractError::missing_column(missing).with_path(path).into());
        }
        let x = frame
            .to_matrix(&envelope.feature_names)
            .map_err(|e| e.with_path(path))?;
        let y_true = labels_from(&frame, TARGET_COLUMN).map_err(|e| e.with_path(path))?;
        let y_pred = envelope.payload.predict(&x)?;

        let report = classification_report(&y_true, &y_pred);
        let result = EvaluationResult {
            accuracy: report.accuracy,
            precision: weighted_precision(&y_true, &y_pred),
        };
        let file = EvaluationReport {
            accuracy: result.accuracy,
            precision: result.precision,
            run_id: ctx.metadata.run_id.to_string(),
            classification_report: Some(report),
            mock: false,
        };
        let record = ctx
            .store
            .write_json(&ctx.layout.evaluation, ArtifactKind::MetricsReport, &file)?;

        info!(
            accuracy = result.accuracy,
            precision = result.precision,
            "Test accuracy: {:.4}, precision: {:.4}",
            result.accuracy,
            result.precision
        );
        Ok(StepOutcome::new(result, ExecutionTier::Full).with_artifact(record))
    }

    fn degraded(&self, ctx: &StepContext) -> Result<StepOutcome<EvaluationResult>, PipelineError> {
        warn!("Using mock evaluation - dependencies not available");
        let file = EvaluationReport {
            accuracy: 0.0,
            precision: 0.0,
            run_id: ctx.metadata.run_id.to_string(),
            classification_report: None,
            mock: true,
        };
        let record = ctx.store.write_placeholder(
            &ctx.layout.evaluation,
            ArtifactKind::MetricsReport,
            &serde_json::to_value(&file)?,
        )?;
        Ok(StepOutcome::new(
            EvaluationResult {
                accuracy: 0.0,
                precision: 0.0,
            },
            ExecutionTier::Degraded,
        )
        .with_artifact(record))
    }
}

#[async_trait]
impl PipelineStep for EvaluateStep {
    type Output = EvaluationResult;

    fn id(&self) -> StepId {
        StepId::Evaluate
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        tier: ExecutionTier,
    ) -> Result<StepOutcome<EvaluationResult>, PipelineError> {
        let outcome = match tier {
            ExecutionTier::Full => self.full(ctx)?,
            ExecutionTier::Degraded => self.degraded(ctx)?,
        };

        let tracking = &ctx.tracking;
        let handle = tracking.start_run(&ctx.tracking_tags(StepId::Evaluate)).await;
        tracking
            .log_metric(&handle, "test_accuracy", outcome.value.accuracy)
            .await;
        tracking
            .log_metric(&handle, "test_precision", outcome.value.precision)
            .await;
        tracking.end_run(&handle, true).await;

        Ok(outcome)
    }
}
