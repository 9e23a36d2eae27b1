//! Core types shared by every pipeline component.

mod artifact;
mod status;

pub use artifact::{ArtifactKind, ArtifactLayout, ArtifactRecord, RunMetadata, SplitRole};
pub use status::{PipelineState, StepId};
