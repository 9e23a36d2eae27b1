//! The fixed four-step graph.
//!
//! Steps run one at a time in the order generate, preprocess, train, evaluate.
//! Each step's tier is resolved once from the capability snapshot before it
//! starts, every step body runs inside [`run_step`], and the first failure
//! stops the run with no successor executed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::capabilities::{CapabilityRecord, CapabilityRegistry, ExecutionTier, TierSelector};
use crate::config::PipelineConfig;
use crate::core::{ArtifactKind, ArtifactLayout, ArtifactRecord, PipelineState, RunMetadata, StepId};
use crate::errors::PipelineError;
use crate::observability::{run_step, LoggingStepEmitter, SpanTimer, StepEmitter};
use crate::quality::{QualityGate, QualityReport};
use crate::steps::{
    DatasetShape, EvaluateStep, EvaluationResult, GenerateStep, PipelineStep, PreprocessStep,
    SplitSizes, StepContext, TrainStep, TrainingResult,
};
use crate::store::ArtifactStore;
use crate::tracking::TrackingAdapter;

/// What one step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Which step.
    pub step: StepId,
    /// The tier it ran in.
    pub tier: ExecutionTier,
    /// Wall time including the tracking mirror.
    pub elapsed_ms: f64,
    /// Everything it wrote.
    pub artifacts: Vec<ArtifactRecord>,
    /// Quality reports for its tabular inputs and outputs.
    pub quality: Vec<QualityReport>,
}

/// Result of a run; also the content of the run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Metadata shared by every artifact.
    pub metadata: RunMetadata,
    /// Capability snapshot the tiers were resolved from.
    pub capabilities: Vec<CapabilityRecord>,
    /// Where the run stopped.
    pub state: PipelineState,
    /// Completed steps, in order.
    pub steps: Vec<StepReport>,
    /// Generate's return value.
    pub dataset: Option<DatasetShape>,
    /// Preprocess's return value.
    pub splits: Option<SplitSizes>,
    /// Train's return value.
    pub training: Option<TrainingResult>,
    /// Evaluate's return value.
    pub evaluation: Option<EvaluationResult>,
    /// Total wall time.
    pub duration_ms: f64,
}

impl RunSummary {
    /// Returns the report of `step` if it completed.
    #[must_use]
    pub fn step(&self, step: StepId) -> Option<&StepReport> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// Returns true if any step ran degraded.
    #[must_use]
    pub fn degraded(&self) -> bool {
        self.steps.iter().any(|r| !r.tier.is_full())
    }
}

/// Sequences the four steps over one [`StepContext`].
pub struct PipelineGraph {
    ctx: StepContext,
    plan: BTreeMap<StepId, ExecutionTier>,
    emitter: Arc<dyn StepEmitter>,
    state: PipelineState,
    summary: RunSummary,
    started: Instant,
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("run_id", &self.ctx.metadata.run_id)
            .field("state", &self.state)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl PipelineGraph {
    /// Builds a graph for `config` with tiers resolved from `registry`.
    ///
    /// The tracking adapter comes from the config when the tracking capability
    /// is present.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation.
    pub fn new(config: PipelineConfig, registry: &CapabilityRegistry) -> Result<Self, PipelineError> {
        let tracking = TrackingAdapter::from_config(&config, registry);
        Self::with_tracking(config, registry, tracking)
    }

    /// Like [`PipelineGraph::new`] with an explicit tracking adapter.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation.
    pub fn with_tracking(
        config: PipelineConfig,
        registry: &CapabilityRegistry,
        tracking: TrackingAdapter,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let plan = TierSelector::new(registry).plan();
        let metadata = config.run_metadata();
        let ctx = StepContext {
            layout: ArtifactLayout::under(&config.output_dir),
            store: ArtifactStore::new(QualityGate::new(registry)),
            tracking,
            metadata: metadata.clone(),
            config: Arc::new(config),
        };

        info!(
            run_id = %metadata.run_id,
            pipeline = %metadata.pipeline_name,
            version = %metadata.pipeline_version,
            ?plan,
            "Pipeline graph ready"
        );

        Ok(Self {
            ctx,
            plan,
            emitter: Arc::new(LoggingStepEmitter),
            state: PipelineState::Pending,
            summary: RunSummary {
                metadata,
                capabilities: registry.records().cloned().collect(),
                state: PipelineState::Pending,
                steps: Vec::new(),
                dataset: None,
                splits: None,
                training: None,
                evaluation: None,
                duration_ms: 0.0,
            },
            started: Instant::now(),
        })
    }

    /// Replaces the lifecycle emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn StepEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// The shared step context.
    #[must_use]
    pub fn context(&self) -> &StepContext {
        &self.ctx
    }

    /// The tier each step will run in.
    #[must_use]
    pub fn plan(&self) -> &BTreeMap<StepId, ExecutionTier> {
        &self.plan
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Results so far.
    #[must_use]
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Runs the next step, if any, and returns which one ran.
    ///
    /// # Errors
    ///
    /// Returns the step's error unchanged. The state does not advance.
    pub async fn run_next(&mut self) -> Result<Option<StepId>, PipelineError> {
        let Some(step) = self.state.next_step() else {
            return Ok(None);
        };
        match step {
            StepId::Generate => {
                let value = self.run(&GenerateStep).await?;
                self.summary.dataset = Some(value);
            }
            StepId::Preprocess => {
                let value = self.run(&PreprocessStep).await?;
                self.summary.splits = Some(value);
            }
            StepId::Train => {
                let value = self.run(&TrainStep).await?;
                self.summary.training = Some(value);
            }
            StepId::Evaluate => {
                let value = self.run(&EvaluateStep).await?;
                self.summary.evaluation = Some(value);
            }
        }
        Ok(Some(step))
    }

    /// Runs every remaining step, then writes the run manifest.
    ///
    /// # Errors
    ///
    /// Returns the first step error; nothing after the failing step runs.
    pub async fn execute(mut self) -> Result<RunSummary, PipelineError> {
        while self.run_next().await?.is_some() {}
        self.finish()
    }

    fn finish(mut self) -> Result<RunSummary, PipelineError> {
        self.summary.duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.ctx
            .store
            .write_json(&self.ctx.layout.manifest, ArtifactKind::MetricsReport, &self.summary)?;

        info!(
            run_id = %self.summary.metadata.run_id,
            state = %self.summary.state,
            duration_ms = self.summary.duration_ms,
            degraded = self.summary.degraded(),
            manifest = %self.ctx.layout.manifest.display(),
            "Pipeline completed"
        );
        Ok(self.summary)
    }

    async fn run<S: PipelineStep>(&mut self, step: &S) -> Result<S::Output, PipelineError> {
        let id = step.id();
        self.state.check(id)?;
        let tier = self
            .plan
            .get(&id)
            .copied()
            .unwrap_or(ExecutionTier::Degraded);

        self.emitter.step_started(id, tier);
        let timer = SpanTimer::start(id.label());
        let ctx = &self.ctx;
        let result = run_step(id.label(), || step.execute(ctx, tier)).await;
        let elapsed_ms = timer.finish();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.emitter
                    .step_failed(id, tier, elapsed_ms, &err.to_string());
                return Err(err);
            }
        };

        self.state = self.state.advance(id)?;
        self.summary.state = self.state;
        self.emitter.step_completed(id, tier, elapsed_ms);
        self.summary.steps.push(StepReport {
            step: id,
            tier: outcome.tier,
            elapsed_ms,
            artifacts: outcome.artifacts,
            quality: outcome.quality,
        });
        Ok(outcome.value)
    }
}
