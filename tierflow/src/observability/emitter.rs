//! Step lifecycle events.

use std::time::Instant;

use crate::capabilities::ExecutionTier;
use crate::core::StepId;

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

/// Receives step lifecycle events from the pipeline graph.
pub trait StepEmitter: Send + Sync {
    /// A step is about to run in `tier`.
    fn step_started(&self, step: StepId, tier: ExecutionTier);

    /// A step finished successfully.
    fn step_completed(&self, step: StepId, tier: ExecutionTier, duration_ms: f64);

    /// A step failed; the run stops here.
    fn step_failed(&self, step: StepId, tier: ExecutionTier, duration_ms: f64, error: &str);
}

/// No-op emitter.
#[derive(Debug, Clone, Default)]
pub struct NoOpStepEmitter;

impl StepEmitter for NoOpStepEmitter {
    fn step_started(&self, _step: StepId, _tier: ExecutionTier) {}
    fn step_completed(&self, _step: StepId, _tier: ExecutionTier, _duration_ms: f64) {}
    fn step_failed(&self, _step: StepId, _tier: ExecutionTier, _duration_ms: f64, _error: &str) {}
}

/// Logging-based emitter.
#[derive(Debug, Clone, Default)]
pub struct LoggingStepEmitter;

impl StepEmitter for LoggingStepEmitter {
    fn step_started(&self, step: StepId, tier: ExecutionTier) {
        tracing::info!(step = %step, %tier, "Step started");
    }

    fn step_completed(&self, step: StepId, tier: ExecutionTier, duration_ms: f64) {
        tracing::info!(step = %step, %tier, duration_ms, "Step completed");
    }

    fn step_failed(&self, step: StepId, tier: ExecutionTier, duration_ms: f64, error: &str) {
        tracing::error!(step = %step, %tier, duration_ms, error, "Step failed");
    }
}
