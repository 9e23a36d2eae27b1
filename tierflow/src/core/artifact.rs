//! Artifact kinds, lineage records and run metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::StepId;

/// The role of a dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRole {
    /// Rows the scaler and the model are fit on.
    Train,
    /// Rows held out for model selection.
    Validation,
    /// Rows held out for final evaluation.
    Test,
}

impl SplitRole {
    /// All roles in the order they are written.
    pub const ALL: [Self; 3] = [Self::Train, Self::Validation, Self::Test];

    /// Returns the role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SplitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type of a persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The generated dataset.
    RawDataset,
    /// One of the three preprocessed splits.
    SplitDataset(SplitRole),
    /// The scaler fit on the train split.
    FittedTransformer,
    /// The trained classifier.
    TrainedModel,
    /// Training metrics or the evaluation report.
    MetricsReport,
}

impl ArtifactKind {
    /// Returns true for kinds persisted as delimited text.
    #[must_use]
    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::RawDataset | Self::SplitDataset(_))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawDataset => write!(f, "raw_dataset"),
            Self::SplitDataset(role) => write!(f, "split_dataset[{role}]"),
            Self::FittedTransformer => write!(f, "fitted_transformer"),
            Self::TrainedModel => write!(f, "trained_model"),
            Self::MetricsReport => write!(f, "metrics_report"),
        }
    }
}

/// Lineage record returned by every artifact write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// What was written.
    pub kind: ArtifactKind,
    /// Where it was written.
    pub path: PathBuf,
    /// Size on disk in bytes.
    pub bytes: u64,
    /// Hex SHA-256 of the bytes on disk.
    pub sha256: String,
    /// Whether the content is a degraded-tier placeholder.
    #[serde(default)]
    pub placeholder: bool,
}

/// Metadata shared by every artifact of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Local run identifier; independent of any tracking service.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline_name: String,
    /// Pipeline version.
    pub pipeline_version: String,
    /// When the run started (ISO 8601).
    pub created_at: String,
    /// Seed for every random choice in the run.
    pub random_seed: u64,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RunMetadata {
    /// Creates run metadata with a fresh run id.
    #[must_use]
    pub fn new(
        pipeline_name: impl Into<String>,
        pipeline_version: impl Into<String>,
        random_seed: u64,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            pipeline_version: pipeline_version.into(),
            created_at: crate::utils::iso_timestamp(),
            random_seed,
            tags: BTreeMap::new(),
        }
    }

    /// Replaces the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Serializes to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Declared artifact paths for one run, rooted at the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Output root.
    pub root: PathBuf,
    /// Raw generated dataset.
    pub raw_data: PathBuf,
    /// Train split.
    pub train_data: PathBuf,
    /// Validation split.
    pub validation_data: PathBuf,
    /// Test split.
    pub test_data: PathBuf,
    /// Fitted scaler envelope.
    pub transformer: PathBuf,
    /// Trained model envelope.
    pub model: PathBuf,
    /// Training metrics JSON.
    pub train_metrics: PathBuf,
    /// Evaluation report JSON.
    pub evaluation: PathBuf,
    /// Run manifest JSON.
    pub manifest: PathBuf,
}

impl ArtifactLayout {
    /// Builds the default layout under `root`.
    #[must_use]
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            raw_data: root.join("data/raw/music_therapy.csv.gz"),
            train_data: root.join("data/processed/train.csv.gz"),
            validation_data: root.join("data/processed/validation.csv.gz"),
            test_data: root.join("data/processed/test.csv.gz"),
            transformer: root.join("models/scaler.bin"),
            model: root.join("models/model.bin"),
            train_metrics: root.join("metrics/train_metrics.json"),
            evaluation: root.join("metrics/evaluation.json"),
            manifest: root.join("manifest.json"),
            root,
        }
    }

    /// Returns the path for a split.
    #[must_use]
    pub fn split(&self, role: SplitRole) -> &Path {
        match role {
            SplitRole::Train => &self.train_data,
            SplitRole::Validation => &self.validation_data,
            SplitRole::Test => &self.test_data,
        }
    }

    /// Returns the (input, output) paths a step reads and writes.
    #[must_use]
    pub fn contract(&self, step: StepId) -> (Vec<&Path>, Vec<&Path>) {
        match step {
            StepId::Generate => (vec![], vec![&self.raw_data]),
            StepId::Preprocess => (
                vec![&self.raw_data],
                vec![
                    &self.train_data,
                    &self.validation_data,
                    &self.test_data,
                    &self.transformer,
                ],
            ),
            StepId::Train => (
                vec![&self.train_data],
                vec![&self.model, &self.train_metrics],
            ),
            StepId::Evaluate => (vec![&self.test_data, &self.model], vec![&self.evaluation]),
        }
    }
}
