//! Execution-tier selection.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::{Capability, CapabilityRegistry};
use crate::core::StepId;

/// Whether a step runs its real computation or its placeholder path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTier {
    /// Real computation.
    Full,
    /// Deterministic placeholder behavior with the same artifact contract.
    Degraded,
}

impl ExecutionTier {
    /// Returns true for the full tier.
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl fmt::Display for ExecutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Capabilities a step needs for its full tier.
///
/// Tracking and cluster support never appear here: they only decide whether
/// the side-channels do any work.
#[must_use]
pub fn requirements(step: StepId) -> BTreeSet<Capability> {
    use Capability::{MlEngine, NumericEngine, TabularEngine};
    match step {
        StepId::Generate | StepId::Preprocess => {
            BTreeSet::from([TabularEngine, NumericEngine, MlEngine])
        }
        StepId::Train | StepId::Evaluate => BTreeSet::from([TabularEngine, MlEngine]),
    }
}

/// Requirements of `step` and every step before it.
///
/// A step only runs full when its inputs were produced in the full tier.
#[must_use]
pub fn effective_requirements(step: StepId) -> BTreeSet<Capability> {
    step.lineage().into_iter().flat_map(requirements).collect()
}

/// Chooses a tier per step from a capability snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TierSelector<'a> {
    registry: &'a CapabilityRegistry,
}

impl<'a> TierSelector<'a> {
    /// Creates a selector over `registry`.
    #[must_use]
    pub fn new(registry: &'a CapabilityRegistry) -> Self {
        Self { registry }
    }

    /// `Full` iff every capability in `required` is available.
    #[must_use]
    pub fn tier_for(&self, step: StepId, required: &BTreeSet<Capability>) -> ExecutionTier {
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !self.registry.is_available(**c))
            .map(Capability::as_str)
            .collect();

        if missing.is_empty() {
            ExecutionTier::Full
        } else {
            debug!(step = %step, ?missing, "Step degraded by missing capabilities");
            ExecutionTier::Degraded
        }
    }

    /// Resolves the tier for `step` from its effective requirements.
    #[must_use]
    pub fn resolve(&self, step: StepId) -> ExecutionTier {
        self.tier_for(step, &effective_requirements(step))
    }

    /// Resolves the tier of every step.
    #[must_use]
    pub fn plan(&self) -> BTreeMap<StepId, ExecutionTier> {
        StepId::ALL
            .into_iter()
            .map(|step| (step, self.resolve(step)))
            .collect()
    }

    /// Whether the tracking side-channel should do any work.
    #[must_use]
    pub fn tracking_enabled(&self) -> bool {
        self.registry.is_available(Capability::TrackingService)
    }

    /// Whether the entry point may compile and submit workflows.
    #[must_use]
    pub fn cluster_enabled(&self) -> bool {
        self.registry.is_available(Capability::ClusterSdk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn every_registry() -> Vec<CapabilityRegistry> {
        (0u8..32)
            .map(|mask| {
                CapabilityRegistry::from_availability(
                    Capability::ALL
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << i) != 0)
                        .map(|(_, c)| c),
                )
            })
            .collect()
    }

    #[test]
    fn test_tier_for_is_pure() {
        for registry in every_registry() {
            let selector = TierSelector::new(&registry);
            for step in StepId::ALL {
                let required = effective_requirements(step);
                assert_eq!(selector.tier_for(step, &required), selector.tier_for(step, &required));
            }
        }
    }

    #[test]
    fn test_all_available_runs_full() {
        let registry = CapabilityRegistry::all_available();
        let plan = TierSelector::new(&registry).plan();
        assert!(plan.values().all(ExecutionTier::is_full));
    }

    #[test]
    fn test_tracking_and_cluster_never_gate_tier() {
        let registry =
            CapabilityRegistry::without(&[Capability::TrackingService, Capability::ClusterSdk]);
        let selector = TierSelector::new(&registry);

        assert!(selector.plan().values().all(ExecutionTier::is_full));
        assert!(!selector.tracking_enabled());
        assert!(!selector.cluster_enabled());
    }

    #[test]
    fn test_missing_engines_degrade_every_step() {
        let registry = CapabilityRegistry::without(&[Capability::TabularEngine, Capability::MlEngine]);
        let plan = TierSelector::new(&registry).plan();
        assert!(plan.values().all(|t| *t == ExecutionTier::Degraded));
    }

    #[test]
    fn test_degradation_is_monotone_along_the_chain() {
        for registry in every_registry() {
            let plan = TierSelector::new(&registry).plan();
            let tiers: Vec<ExecutionTier> = StepId::ALL.iter().map(|s| plan[s]).collect();
            for pair in tiers.windows(2) {
                assert!(!(pair[0] == ExecutionTier::Degraded && pair[1] == ExecutionTier::Full));
            }
        }
    }

    #[test]
    fn test_own_requirements() {
        assert!(!requirements(StepId::Train).contains(&Capability::NumericEngine));
        assert!(effective_requirements(StepId::Train).contains(&Capability::NumericEngine));
        assert!(!effective_requirements(StepId::Evaluate).contains(&Capability::TrackingService));
    }
}
