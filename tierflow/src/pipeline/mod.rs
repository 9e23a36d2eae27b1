//! Pipeline graph execution.
//!
//! This module provides:
//! - The fixed generate, preprocess, train, evaluate graph
//! - Per-step reports and the run summary written as the run manifest

mod graph;

#[cfg(test)]
mod integration_tests;

pub use graph::{PipelineGraph, RunSummary, StepReport};
