//! Capability probing and the process-wide registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// An optional runtime subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Delimited-text datasets with optional gzip (csv + flate2).
    TabularEngine,
    /// Dense numeric arrays (ndarray).
    NumericEngine,
    /// Data generation, splitting and the classifier (rand + in-crate forest).
    MlEngine,
    /// MLflow-compatible experiment tracking over HTTP.
    TrackingService,
    /// Workflow compilation and submission to an orchestrator.
    ClusterSdk,
}

impl Capability {
    /// Every capability, in probe order.
    pub const ALL: [Self; 5] = [
        Self::TabularEngine,
        Self::NumericEngine,
        Self::MlEngine,
        Self::TrackingService,
        Self::ClusterSdk,
    ];

    /// Returns the capability name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TabularEngine => "tabular_engine",
            Self::NumericEngine => "numeric_engine",
            Self::MlEngine => "ml_engine",
            Self::TrackingService => "tracking_service",
            Self::ClusterSdk => "cluster_sdk",
        }
    }

    /// Parses a capability name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// The backend that provides the capability and its version.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        match self {
            Self::TabularEngine => "csv 1.3 + flate2 1.1",
            Self::NumericEngine => "ndarray 0.16",
            Self::MlEngine => "rand 0.8 + forest",
            Self::TrackingService => "reqwest 0.12 (mlflow rest)",
            Self::ClusterSdk => "serde_yaml 0.9 + reqwest 0.12",
        }
    }

    /// The minimum backend version the pipeline is written against.
    #[must_use]
    pub fn version_floor(&self) -> &'static str {
        match self {
            Self::TabularEngine => "1.3.0+",
            Self::NumericEngine => "0.16.0+",
            Self::MlEngine => "0.8.0+",
            Self::TrackingService => "0.12.0+",
            Self::ClusterSdk => "0.9.0+",
        }
    }

    /// What the pipeline does instead when the capability is missing.
    #[must_use]
    pub fn degraded_behavior(&self) -> &'static str {
        match self {
            Self::TabularEngine => "quality checks skipped, placeholder datasets",
            Self::NumericEngine => "mock data generation and preprocessing",
            Self::MlEngine => "mock models",
            Self::TrackingService => "experiment tracking disabled",
            Self::ClusterSdk => "local execution only",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The probe outcome for one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// The capability.
    pub name: Capability,
    /// Whether it can be used.
    pub available: bool,
    /// The reported backend version.
    pub version: Option<String>,
    /// The minimum version required.
    pub required_version_floor: String,
    /// Why the capability is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CapabilityRecord {
    /// Creates an available record.
    #[must_use]
    pub fn available(name: Capability, version: impl Into<String>) -> Self {
        Self {
            name,
            available: true,
            version: Some(version.into()),
            required_version_floor: name.version_floor().to_string(),
            reason: None,
        }
    }

    /// Creates an unavailable record.
    #[must_use]
    pub fn unavailable(name: Capability, reason: impl Into<String>) -> Self {
        Self {
            name,
            available: false,
            version: None,
            required_version_floor: name.version_floor().to_string(),
            reason: Some(reason.into()),
        }
    }
}

/// Resolves whether one capability is present.
pub trait CapabilityProbe: Send + Sync {
    /// The capability this probe checks.
    fn capability(&self) -> Capability;

    /// Returns the backend version, or why the capability is absent.
    fn probe(&self) -> Result<String, String>;
}

/// Probe for the backends compiled into this binary.
///
/// Engine capabilities are always compiled in; tracking and cluster support
/// depend on the `tracking` and `cluster` cargo features. Any capability can
/// be switched off at runtime.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinProbe {
    capability: Capability,
    disabled: bool,
}

impl BuiltinProbe {
    /// Creates a probe.
    #[must_use]
    pub fn new(capability: Capability, disabled: bool) -> Self {
        Self {
            capability,
            disabled,
        }
    }

    fn compiled_in(&self) -> Result<(), String> {
        match self.capability {
            Capability::TabularEngine | Capability::NumericEngine | Capability::MlEngine => Ok(()),
            Capability::TrackingService if cfg!(feature = "tracking") => Ok(()),
            Capability::TrackingService => Err("compiled without the `tracking` feature".into()),
            Capability::ClusterSdk if cfg!(feature = "cluster") => Ok(()),
            Capability::ClusterSdk => Err("compiled without the `cluster` feature".into()),
        }
    }
}

impl CapabilityProbe for BuiltinProbe {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn probe(&self) -> Result<String, String> {
        if self.disabled {
            return Err("disabled by PIPELINE_DISABLE_CAPABILITIES".to_string());
        }
        self.compiled_in()?;
        Ok(self.capability.backend().to_string())
    }
}

/// Builds the default probes, treating `disabled` capabilities as absent.
#[must_use]
pub fn builtin_probes(disabled: &BTreeSet<Capability>) -> Vec<Box<dyn CapabilityProbe>> {
    Capability::ALL
        .into_iter()
        .map(|c| Box::new(BuiltinProbe::new(c, disabled.contains(&c))) as Box<dyn CapabilityProbe>)
        .collect()
}

static GLOBAL_REGISTRY: OnceLock<CapabilityRegistry> = OnceLock::new();

/// Immutable snapshot of which capabilities are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRegistry {
    records: BTreeMap<Capability, CapabilityRecord>,
}

impl CapabilityRegistry {
    /// Detects capabilities once per process and caches the result.
    ///
    /// Later calls return the cached snapshot and ignore `disabled`.
    pub fn detect(disabled: &BTreeSet<Capability>) -> &'static Self {
        GLOBAL_REGISTRY.get_or_init(|| Self::detect_with(&builtin_probes(disabled)))
    }

    /// Returns the cached snapshot if [`CapabilityRegistry::detect`] ran.
    pub fn global() -> Option<&'static Self> {
        GLOBAL_REGISTRY.get()
    }

    /// Runs the given probes. Never fails; missing probes mean unavailable.
    #[must_use]
    pub fn detect_with(probes: &[Box<dyn CapabilityProbe>]) -> Self {
        let mut records = BTreeMap::new();

        for probe in probes {
            let capability = probe.capability();
            let record = match probe.probe() {
                Ok(version) => {
                    info!(capability = %capability, version = %version, "Capability available");
                    CapabilityRecord::available(capability, version)
                }
                Err(reason) => {
                    warn!(
                        capability = %capability,
                        reason = %reason,
                        degraded = capability.degraded_behavior(),
                        "Capability not available"
                    );
                    CapabilityRecord::unavailable(capability, reason)
                }
            };
            records.insert(capability, record);
        }

        for capability in Capability::ALL {
            records
                .entry(capability)
                .or_insert_with(|| CapabilityRecord::unavailable(capability, "no probe registered"));
        }

        Self { records }
    }

    /// Builds a registry from explicit availability flags.
    #[must_use]
    pub fn from_availability(available: impl IntoIterator<Item = Capability>) -> Self {
        let available: BTreeSet<Capability> = available.into_iter().collect();
        let records = Capability::ALL
            .into_iter()
            .map(|c| {
                let record = if available.contains(&c) {
                    CapabilityRecord::available(c, c.backend())
                } else {
                    CapabilityRecord::unavailable(c, "not present")
                };
                (c, record)
            })
            .collect();
        Self { records }
    }

    /// A registry with every capability present.
    #[must_use]
    pub fn all_available() -> Self {
        Self::from_availability(Capability::ALL)
    }

    /// A registry with every capability present except `missing`.
    #[must_use]
    pub fn without(missing: &[Capability]) -> Self {
        Self::from_availability(Capability::ALL.into_iter().filter(|c| !missing.contains(c)))
    }

    /// Returns true if the capability is present.
    #[must_use]
    pub fn is_available(&self, capability: Capability) -> bool {
        self.records.get(&capability).is_some_and(|r| r.available)
    }

    /// Returns the record for a capability.
    #[must_use]
    pub fn record(&self, capability: Capability) -> Option<&CapabilityRecord> {
        self.records.get(&capability)
    }

    /// Iterates over all records.
    pub fn records(&self) -> impl Iterator<Item = &CapabilityRecord> {
        self.records.values()
    }

    /// Returns the set of available capabilities.
    #[must_use]
    pub fn available(&self) -> BTreeSet<Capability> {
        self.records
            .values()
            .filter(|r| r.available)
            .map(|r| r.name)
            .collect()
    }
}

impl fmt::Display for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.records.values() {
            let mark = if record.available { "available" } else { "missing" };
            write!(f, "{:<17} {:<10}", record.name.as_str(), mark)?;
            match (&record.version, &record.reason) {
                (Some(version), _) => writeln!(f, " {version} (requires {})", record.required_version_floor)?,
                (None, Some(reason)) => writeln!(f, " {reason} -> {}", record.name.degraded_behavior())?,
                (None, None) => writeln!(f)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Capability, Result<String, String>);

    impl CapabilityProbe for FixedProbe {
        fn capability(&self) -> Capability {
            self.0
        }

        fn probe(&self) -> Result<String, String> {
            self.1.clone()
        }
    }

    #[test]
    fn test_capability_names_roundtrip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::parse(capability.as_str()), Some(capability));
        }
        assert_eq!(Capability::parse("gpu"), None);
    }

    #[test]
    fn test_detect_with_records_every_capability() {
        let probes: Vec<Box<dyn CapabilityProbe>> = vec![
            Box::new(FixedProbe(Capability::TabularEngine, Ok("csv 1.3".into()))),
            Box::new(FixedProbe(Capability::MlEngine, Err("not installed".into()))),
        ];
        let registry = CapabilityRegistry::detect_with(&probes);

        assert!(registry.is_available(Capability::TabularEngine));
        assert!(!registry.is_available(Capability::MlEngine));
        assert_eq!(registry.records().count(), Capability::ALL.len());

        let missing = registry.record(Capability::ClusterSdk).unwrap();
        assert!(!missing.available);
        assert_eq!(missing.reason.as_deref(), Some("no probe registered"));

        let ml = registry.record(Capability::MlEngine).unwrap();
        assert_eq!(ml.version, None);
        assert_eq!(ml.required_version_floor, "0.8.0+");
    }

    #[test]
    fn test_disabled_builtin_probe() {
        let disabled = BTreeSet::from([Capability::NumericEngine]);
        let registry = CapabilityRegistry::detect_with(&builtin_probes(&disabled));

        assert!(!registry.is_available(Capability::NumericEngine));
        assert!(registry.is_available(Capability::TabularEngine));
        assert!(registry.is_available(Capability::MlEngine));
    }

    #[test]
    fn test_builtin_probe_follows_features() {
        let probe = BuiltinProbe::new(Capability::TrackingService, false);
        assert_eq!(probe.probe().is_ok(), cfg!(feature = "tracking"));
    }

    #[test]
    fn test_without() {
        let registry = CapabilityRegistry::without(&[Capability::TrackingService]);
        assert!(!registry.is_available(Capability::TrackingService));
        assert_eq!(registry.available().len(), 4);
    }

    #[test]
    fn test_global_is_cached() {
        let first = CapabilityRegistry::detect(&BTreeSet::new());
        let second = CapabilityRegistry::detect(&BTreeSet::from([Capability::TabularEngine]));
        assert!(std::ptr::eq(first, second));
        assert!(CapabilityRegistry::global().is_some());
    }

    #[test]
    fn test_record_serialize() {
        let record = CapabilityRecord::available(Capability::NumericEngine, "ndarray 0.16");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "numeric_engine");
        assert!(json.get("reason").is_none());
    }
}
