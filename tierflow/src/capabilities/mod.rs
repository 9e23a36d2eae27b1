//! Capability registry and execution-tier selection.
//!
//! Availability checks happen here and nowhere else: steps receive a resolved
//! [`ExecutionTier`] at entry and never probe for subsystems themselves.

mod registry;
mod tier;

pub use registry::{
    builtin_probes, BuiltinProbe, Capability, CapabilityProbe, CapabilityRecord,
    CapabilityRegistry,
};
pub use tier::{effective_requirements, requirements, ExecutionTier, TierSelector};
