//! Testing utilities for tierflow pipelines.
//!
//! This module provides:
//! - Recording and failing tracking backends
//! - A recording step emitter
//! - Capability registry and config fixtures

mod fixtures;
mod mocks;

pub use fixtures::{
    degraded_registry, full_registry, local_registry, step_context, test_config, tracking_with,
};
pub use mocks::{
    RecordingBackend, RecordingEmitter, StepEvent, TrackingCall, UnavailableBackend,
};
