//! Classifier training.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{feature_columns, labels_from, PipelineStep, StepContext, StepOutcome, TARGET_COLUMN};
use crate::capabilities::ExecutionTier;
use crate::core::{ArtifactKind, StepId};
use crate::errors::PipelineError;
use crate::ml::{accuracy, ForestParams, RandomForest};
use crate::store::Envelope;
use crate::utils::iso_timestamp;

/// What training returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Accuracy on the train split.
    pub accuracy: f64,
    /// Local run id.
    pub run_id: String,
}

/// Contents of the training metrics file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Accuracy on the train split.
    pub accuracy: f64,
    /// Local run id.
    pub run_id: String,
    /// Registered model version when the tracking mirror accepted the model,
    /// otherwise the local run id.
    pub model_version: String,
    /// Set when written by the degraded tier.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mock: bool,
}

/// Fits the random forest on the train split.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainStep;

impl TrainStep {
    async fn full(&self, ctx: &StepContext) -> Result<StepOutcome<TrainingResult>, PipelineError> {
        let path = &ctx.layout.train_data;
        let frame = ctx.store.read_tabular(path)?;
        let labels = labels_from(&frame, TARGET_COLUMN).map_err(|e| e.with_path(path))?;
        let names = feature_columns(&frame, TARGET_COLUMN);
        let x = frame.to_matrix(&names).map_err(|e| e.with_path(path))?;

        let n_classes = labels.iter().max().map_or(0, |m| m + 1);
        let params = ForestParams::from(&ctx.config.model);
        info!(
            n_estimators = params.n_estimators,
            max_depth = params.max_depth,
            rows = x.nrows(),
            features = names.len(),
            "Training random forest"
        );
        let model = RandomForest::fit(&x, &labels, n_classes, params)?;
        let train_accuracy = accuracy(&labels, &model.predict(&x)?);

        let run_id = ctx.metadata.run_id.to_string();
        let envelope = Envelope::new(ArtifactKind::TrainedModel, model)
            .with_feature_names(names)
            .with_metadata(ctx.artifact_metadata(json!({
                "model_type": "RandomForestClassifier",
                "trained_at": iso_timestamp(),
                "n_classes": n_classes,
                "train_samples": x.nrows(),
                "train_accuracy": train_accuracy,
            })));
        let model_record = ctx.store.write_envelope(&ctx.layout.model, &envelope)?;

        let registered = self
            .mirror(ctx, ExecutionTier::Full, train_accuracy)
            .await;
        let metrics = TrainingMetrics {
            accuracy: train_accuracy,
            run_id: run_id.clone(),
            model_version: registered.unwrap_or_else(|| run_id.clone()),
            mock: false,
        };
        let metrics_record =
            ctx.store
                .write_json(&ctx.layout.train_metrics, ArtifactKind::MetricsReport, &metrics)?;

        info!(accuracy = train_accuracy, "Training accuracy: {train_accuracy:.4}");
        Ok(StepOutcome::new(
            TrainingResult {
                accuracy: train_accuracy,
                run_id,
            },
            ExecutionTier::Full,
        )
        .with_artifacts([model_record, metrics_record]))
    }

    async fn degraded(&self, ctx: &StepContext) -> Result<StepOutcome<TrainingResult>, PipelineError> {
        warn!("Using mock training - dependencies not available");
        let run_id = ctx.metadata.run_id.to_string();
        let model_record = ctx.store.write_placeholder(
            &ctx.layout.model,
            ArtifactKind::TrainedModel,
            &json!({
                "mock": true,
                "model_type": "RandomForestClassifier",
                "params": ForestParams::from(&ctx.config.model),
            }),
        )?;

        let metrics = TrainingMetrics {
            accuracy: 0.0,
            run_id: run_id.clone(),
            model_version: run_id.clone(),
            mock: true,
        };
        let metrics_record = ctx.store.write_placeholder(
            &ctx.layout.train_metrics,
            ArtifactKind::MetricsReport,
            &serde_json::to_value(&metrics)?,
        )?;
        self.mirror(ctx, ExecutionTier::Degraded, 0.0).await;

        Ok(StepOutcome::new(
            TrainingResult {
                accuracy: 0.0,
                run_id,
            },
            ExecutionTier::Degraded,
        )
        .with_artifacts([model_record, metrics_record]))
    }

    /// Mirrors parameters and the accuracy to the tracking service. Only a
    /// trained model is registered; returns its version.
    async fn mirror(&self, ctx: &StepContext, tier: ExecutionTier, train_accuracy: f64) -> Option<String> {
        let tracking = &ctx.tracking;
        let handle = tracking.start_run(&ctx.tracking_tags(StepId::Train)).await;
        let model = &ctx.config.model;

        tracking.log_param(&handle, "n_estimators", model.n_estimators).await;
        tracking.log_param(&handle, "max_depth", model.max_depth).await;
        tracking.log_param(&handle, "min_samples_split", model.min_samples_split).await;
        tracking.log_param(&handle, "min_samples_leaf", model.min_samples_leaf).await;
        tracking.log_param(&handle, "max_features", model.max_features).await;
        tracking.log_param(&handle, "bootstrap", model.bootstrap).await;
        tracking.log_param(&handle, "random_state", model.random_state).await;
        tracking.log_param(&handle, "tier", tier).await;
        tracking.log_metric(&handle, "train_accuracy", train_accuracy).await;
        let version = match tier {
            ExecutionTier::Full => {
                tracking
                    .log_model_artifact(&handle, &ctx.layout.model, &ctx.config.tracking.model_name)
                    .await
            }
            ExecutionTier::Degraded => None,
        };
        tracking.end_run(&handle, true).await;
        version
    }
}

#[async_trait]
impl PipelineStep for TrainStep {
    type Output = TrainingResult;

    fn id(&self) -> StepId {
        StepId::Train
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        tier: ExecutionTier,
    ) -> Result<StepOutcome<TrainingResult>, PipelineError> {
        match tier {
            ExecutionTier::Full => self.full(ctx).await,
            ExecutionTier::Degraded => self.degraded(ctx).await,
        }
    }
}
