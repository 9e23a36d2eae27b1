//! Registries, configs and contexts for tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::{Capability, CapabilityRegistry};
use crate::config::PipelineConfig;
use crate::core::ArtifactLayout;
use crate::quality::QualityGate;
use crate::steps::StepContext;
use crate::store::ArtifactStore;
use crate::tracking::{TrackingAdapter, TrackingBackend};

/// Every capability present.
#[must_use]
pub fn full_registry() -> CapabilityRegistry {
    CapabilityRegistry::all_available()
}

/// Engines present, no tracking and no cluster SDK.
#[must_use]
pub fn local_registry() -> CapabilityRegistry {
    CapabilityRegistry::without(&[Capability::TrackingService, Capability::ClusterSdk])
}

/// Neither the tabular nor the ML engine: every step runs degraded.
#[must_use]
pub fn degraded_registry() -> CapabilityRegistry {
    CapabilityRegistry::without(&[Capability::TabularEngine, Capability::MlEngine])
}

/// Default config writing under `dir`, with a small forest so tests stay fast.
#[must_use]
pub fn test_config(dir: impl AsRef<Path>) -> PipelineConfig {
    PipelineConfig::default()
        .with_output_dir(dir.as_ref())
        .with_estimators(20)
}

/// An adapter over `backend` with a short timeout.
#[must_use]
pub fn tracking_with(backend: Arc<dyn TrackingBackend>) -> TrackingAdapter {
    TrackingAdapter::new(backend, Duration::from_millis(200))
}

/// A step context for `config` under `registry`, with tracking disabled.
#[must_use]
pub fn step_context(config: PipelineConfig, registry: &CapabilityRegistry) -> StepContext {
    StepContext {
        layout: ArtifactLayout::under(&config.output_dir),
        store: ArtifactStore::new(QualityGate::new(registry)),
        tracking: TrackingAdapter::disabled(),
        metadata: config.run_metadata(),
        config: Arc::new(config),
    }
}
