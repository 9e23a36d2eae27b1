//! Pipeline configuration.
//!
//! [`PipelineConfig`] is resolved once at startup from environment variables
//! (with documented defaults), validated, and then shared read-only as an
//! `Arc<PipelineConfig>`. Resolution goes through a lookup closure so tests
//! can supply variables without touching the process environment.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::capabilities::Capability;
use crate::core::RunMetadata;
use crate::errors::ConfigError;

/// Default pipeline name.
pub const PIPELINE_NAME: &str = "music-therapy-ml-pipeline";
/// Default pipeline version.
pub const PIPELINE_VERSION: &str = "2.0.0";

/// Complete, immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline identity.
    #[serde(default)]
    pub pipeline: PipelineInfo,
    /// Dataset shape and split fractions.
    #[serde(default)]
    pub data: DataConfig,
    /// Classifier hyper-parameters.
    #[serde(default)]
    pub model: ModelConfig,
    /// Experiment-tracking settings.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Cluster-orchestration settings.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Root directory for all artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Capabilities to treat as absent even when compiled in.
    #[serde(default)]
    pub disabled_capabilities: BTreeSet<Capability>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineInfo::default(),
            data: DataConfig::default(),
            model: ModelConfig::default(),
            tracking: TrackingConfig::default(),
            cluster: ClusterConfig::default(),
            output_dir: default_output_dir(),
            disabled_capabilities: BTreeSet::new(),
        }
    }
}

impl PipelineConfig {
    /// Resolves the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };
        let defaults = Self::default();

        let random_state = env.parse("RANDOM_STATE", defaults.data.random_state)?;

        let data = DataConfig {
            n_samples: env.parse("DATA_SAMPLES", defaults.data.n_samples)?,
            n_features: env.parse("DATA_FEATURES", defaults.data.n_features)?,
            n_classes: env.parse("DATA_CLASSES", defaults.data.n_classes)?,
            test_size: env.parse("TEST_SIZE", defaults.data.test_size)?,
            validation_size: env.parse("VALIDATION_SIZE", defaults.data.validation_size)?,
            random_state,
        };

        let model = ModelConfig {
            n_estimators: env.parse("MODEL_N_ESTIMATORS", defaults.model.n_estimators)?,
            max_depth: env.parse("MODEL_MAX_DEPTH", defaults.model.max_depth)?,
            min_samples_split: env.parse("MODEL_MIN_SAMPLES_SPLIT", defaults.model.min_samples_split)?,
            min_samples_leaf: env.parse("MODEL_MIN_SAMPLES_LEAF", defaults.model.min_samples_leaf)?,
            max_features: env.parse("MODEL_MAX_FEATURES", defaults.model.max_features)?,
            bootstrap: env
                .get("MODEL_BOOTSTRAP")
                .map_or(defaults.model.bootstrap, |v| v.trim().eq_ignore_ascii_case("true")),
            random_state,
        };

        let tracking = TrackingConfig {
            tracking_uri: env.string("MLFLOW_TRACKING_URI", defaults.tracking.tracking_uri),
            experiment_name: env.string("MLFLOW_EXPERIMENT", defaults.tracking.experiment_name),
            model_name: env.string("MLFLOW_MODEL_NAME", defaults.tracking.model_name),
            artifact_location: env.get("MLFLOW_ARTIFACT_LOCATION"),
            environment: env.string("ENVIRONMENT", defaults.tracking.environment),
            timeout_seconds: env.parse("MLFLOW_TIMEOUT_SECONDS", defaults.tracking.timeout_seconds)?,
        };

        let cluster = ClusterConfig {
            host: env.string("KFP_HOST", defaults.cluster.host.clone()),
            ..defaults.cluster
        };

        let disabled_capabilities = match env.get("PIPELINE_DISABLE_CAPABILITIES") {
            Some(raw) => parse_capability_list(&raw)?,
            None => BTreeSet::new(),
        };

        let config = Self {
            pipeline: defaults.pipeline,
            data,
            model,
            tracking,
            cluster,
            output_dir: env
                .get("PIPELINE_OUTPUT_DIR")
                .map_or(defaults.output_dir, PathBuf::from),
            disabled_capabilities,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invariant`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let data = &self.data;
        if data.n_samples == 0 {
            return Err(ConfigError::Invariant("DATA_SAMPLES must be positive".into()));
        }
        if data.n_features == 0 {
            return Err(ConfigError::Invariant("DATA_FEATURES must be positive".into()));
        }
        if data.n_classes < 2 {
            return Err(ConfigError::Invariant("DATA_CLASSES must be at least 2".into()));
        }
        for (key, value) in [("TEST_SIZE", data.test_size), ("VALIDATION_SIZE", data.validation_size)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::Invariant(format!(
                    "{key} must be in (0, 1), got {value}"
                )));
            }
        }
        if data.test_size + data.validation_size >= 1.0 {
            return Err(ConfigError::Invariant(format!(
                "TEST_SIZE + VALIDATION_SIZE must be below 1.0, got {}",
                data.test_size + data.validation_size
            )));
        }

        let model = &self.model;
        if model.n_estimators == 0 {
            return Err(ConfigError::Invariant("MODEL_N_ESTIMATORS must be positive".into()));
        }
        if model.max_depth == 0 {
            return Err(ConfigError::Invariant("MODEL_MAX_DEPTH must be positive".into()));
        }
        if model.min_samples_split < 2 {
            return Err(ConfigError::Invariant("MODEL_MIN_SAMPLES_SPLIT must be at least 2".into()));
        }
        if model.min_samples_leaf == 0 {
            return Err(ConfigError::Invariant("MODEL_MIN_SAMPLES_LEAF must be positive".into()));
        }
        if matches!(model.max_features, MaxFeatures::Count(0)) {
            return Err(ConfigError::Invariant("MODEL_MAX_FEATURES must be positive".into()));
        }
        if !(self.tracking.timeout_seconds > 0.0) {
            return Err(ConfigError::Invariant("MLFLOW_TIMEOUT_SECONDS must be positive".into()));
        }
        Ok(())
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the dataset shape.
    #[must_use]
    pub fn with_data_shape(mut self, n_samples: usize, n_features: usize, n_classes: usize) -> Self {
        self.data.n_samples = n_samples;
        self.data.n_features = n_features;
        self.data.n_classes = n_classes;
        self
    }

    /// Sets the number of trees.
    #[must_use]
    pub fn with_estimators(mut self, n_estimators: usize) -> Self {
        self.model.n_estimators = n_estimators;
        self
    }

    /// Sets the seed for both data and model.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.data.random_state = seed;
        self.model.random_state = seed;
        self
    }

    /// Builds the run metadata for a new run.
    #[must_use]
    pub fn run_metadata(&self) -> RunMetadata {
        RunMetadata::new(
            &self.pipeline.name,
            &self.pipeline.version,
            self.data.random_state,
        )
        .with_tag("environment", &self.tracking.environment)
        .with_tag("team", &self.pipeline.team)
        .with_tag("use_case", &self.pipeline.use_case)
    }

    /// Tags attached to the tracking experiment.
    #[must_use]
    pub fn tracking_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("pipeline_version".to_string(), self.pipeline.version.clone()),
            ("environment".to_string(), self.tracking.environment.clone()),
            ("team".to_string(), self.pipeline.team.clone()),
            ("use_case".to_string(), self.pipeline.use_case.clone()),
        ])
    }
}

/// Pipeline identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    /// Pipeline name.
    pub name: String,
    /// Pipeline version.
    pub version: String,
    /// One-line description.
    pub description: String,
    /// Owning team.
    pub team: String,
    /// Use case tag.
    pub use_case: String,
}

impl Default for PipelineInfo {
    fn default() -> Self {
        Self {
            name: PIPELINE_NAME.to_string(),
            version: PIPELINE_VERSION.to_string(),
            description: "End-to-end ML pipeline for music therapy model with MLflow tracking"
                .to_string(),
            team: "lucid-therapeutics".to_string(),
            use_case: "music-therapy".to_string(),
        }
    }
}

/// Dataset shape and split fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Number of generated rows.
    pub n_samples: usize,
    /// Number of base features.
    pub n_features: usize,
    /// Number of target classes.
    pub n_classes: usize,
    /// Fraction of rows held out for testing.
    pub test_size: f64,
    /// Fraction of rows held out for validation.
    pub validation_size: f64,
    /// Seed for generation and splitting.
    pub random_state: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            n_features: 10,
            n_classes: 3,
            test_size: 0.2,
            validation_size: 0.1,
            random_state: 42,
        }
    }
}

/// How many features each tree split considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `floor(sqrt(n))`, at least one.
    Sqrt,
    /// `floor(log2(n))`, at least one.
    Log2,
    /// Every feature.
    All,
    /// A fixed count, capped at `n`.
    Count(usize),
}

impl MaxFeatures {
    /// Resolves the per-split feature count for `n_features` columns.
    #[must_use]
    pub fn resolve(&self, n_features: usize) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let count = match self {
            Self::Sqrt => (n_features as f64).sqrt().floor() as usize,
            Self::Log2 => (n_features as f64).log2().floor() as usize,
            Self::All => n_features,
            Self::Count(n) => *n,
        };
        count.clamp(1, n_features.max(1))
    }
}

impl FromStr for MaxFeatures {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqrt" | "auto" => Ok(Self::Sqrt),
            "log2" => Ok(Self::Log2),
            "all" | "none" => Ok(Self::All),
            other => other
                .parse::<usize>()
                .map(Self::Count)
                .map_err(|_| "expected sqrt, log2, all or an integer".to_string()),
        }
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqrt => write!(f, "sqrt"),
            Self::Log2 => write!(f, "log2"),
            Self::All => write!(f, "all"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Classifier hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of trees.
    pub n_estimators: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum rows required to split a node.
    pub min_samples_split: usize,
    /// Minimum rows in each leaf.
    pub min_samples_leaf: usize,
    /// Features considered per split.
    pub max_features: MaxFeatures,
    /// Whether each tree sees a bootstrap sample.
    pub bootstrap: bool,
    /// Seed for tree construction.
    pub random_state: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 42,
        }
    }
}

/// Experiment-tracking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URL of the tracking server.
    pub tracking_uri: String,
    /// Experiment name.
    pub experiment_name: String,
    /// Registered-model name.
    pub model_name: String,
    /// Artifact location for a newly created experiment.
    pub artifact_location: Option<String>,
    /// Deployment environment tag.
    pub environment: String,
    /// Per-call timeout in seconds.
    pub timeout_seconds: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: "http://mlflow-service.mlflow:5000".to_string(),
            experiment_name: "music-therapy-model".to_string(),
            model_name: "music-therapy-classifier".to_string(),
            artifact_location: None,
            environment: "development".to_string(),
            timeout_seconds: 5.0,
        }
    }
}

impl TrackingConfig {
    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

/// Cluster-orchestration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Orchestrator endpoint.
    pub host: String,
    /// Experiment runs are filed under.
    pub experiment_name: String,
    /// Display name for submitted runs.
    pub job_name: String,
    /// Where the compiled workflow is written.
    pub package_path: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            experiment_name: "Default".to_string(),
            job_name: "music-therapy-ml-run".to_string(),
            package_path: PathBuf::from("music_therapy_pipeline.yaml"),
        }
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).unwrap_or(default)
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid_value(key, raw.clone(), e.to_string())),
            None => Ok(default),
        }
    }
}

fn parse_capability_list(raw: &str) -> Result<BTreeSet<Capability>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Capability::parse(name).ok_or_else(|| {
                ConfigError::invalid_value(
                    "PIPELINE_DISABLE_CAPABILITIES",
                    raw,
                    format!("unknown capability '{name}'"),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.data.n_samples, 1000);
        assert_eq!(config.model.max_features, MaxFeatures::Sqrt);
        assert!(config.model.bootstrap);
        assert_eq!(config.tracking.experiment_name, "music-therapy-model");
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("DATA_SAMPLES", "500"),
            ("RANDOM_STATE", "7"),
            ("MODEL_MAX_FEATURES", "log2"),
            ("MODEL_BOOTSTRAP", "False"),
            ("PIPELINE_OUTPUT_DIR", "/tmp/out"),
            ("PIPELINE_DISABLE_CAPABILITIES", "tracking_service, cluster_sdk"),
        ])
        .unwrap();

        assert_eq!(config.data.n_samples, 500);
        assert_eq!(config.data.random_state, 7);
        assert_eq!(config.model.random_state, 7);
        assert_eq!(config.model.max_features, MaxFeatures::Log2);
        assert!(!config.model.bootstrap);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert!(config.disabled_capabilities.contains(&Capability::TrackingService));
        assert!(config.disabled_capabilities.contains(&Capability::ClusterSdk));
    }

    #[test]
    fn test_invalid_number() {
        let err = config_from(&[("TEST_SIZE", "a fifth")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TEST_SIZE"));
    }

    #[test]
    fn test_fraction_sum_invariant() {
        let err = config_from(&[("TEST_SIZE", "0.6"), ("VALIDATION_SIZE", "0.4")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invariant(_)));

        assert!(config_from(&[("TEST_SIZE", "0.5"), ("VALIDATION_SIZE", "0.3")]).is_ok());
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let err = config_from(&[("PIPELINE_DISABLE_CAPABILITIES", "gpu")]).unwrap_err();
        assert!(err.to_string().contains("unknown capability 'gpu'"));
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(13), 3);
        assert_eq!(MaxFeatures::Log2.resolve(13), 3);
        assert_eq!(MaxFeatures::All.resolve(13), 13);
        assert_eq!(MaxFeatures::Count(50).resolve(13), 13);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!("7".parse::<MaxFeatures>().unwrap(), MaxFeatures::Count(7));
    }

    #[test]
    fn test_run_metadata_tags() {
        let meta = PipelineConfig::default().run_metadata();
        assert_eq!(meta.pipeline_name, PIPELINE_NAME);
        assert_eq!(meta.random_seed, 42);
        assert_eq!(meta.tags.get("environment").map(String::as_str), Some("development"));
    }
}
