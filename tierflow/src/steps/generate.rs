//! Synthetic music-therapy dataset generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{PipelineStep, StepContext, StepOutcome, CATEGORY_COLUMN, TARGET_COLUMN};
use crate::capabilities::ExecutionTier;
use crate::core::{ArtifactKind, StepId};
use crate::errors::PipelineError;
use crate::frame::{Column, DataFrame};
use crate::ml::{make_classification, rescale_column, ClassificationSpec};
use crate::utils::iso_timestamp;

/// Named features and the range each is rescaled into.
pub const FEATURE_RANGES: [(&str, f64, f64); 10] = [
    ("tempo_bpm", 60.0, 200.0),
    ("energy_level", 0.0, 1.0),
    ("valence_score", 0.0, 1.0),
    ("danceability", 0.0, 1.0),
    ("acousticness", 0.0, 1.0),
    ("instrumentalness", 0.0, 1.0),
    ("liveness_factor", 0.0, 1.0),
    ("speechiness", 0.0, 1.0),
    ("loudness_db", -40.0, 0.0),
    ("duration_seconds", 30.0, 600.0),
];

const CATEGORY_NAMES: [&str; 3] = ["relaxation", "motivation", "focus"];

/// Rows and base features of the generated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    /// Rows.
    pub samples: usize,
    /// Base feature columns.
    pub features: usize,
}

/// Writes the raw dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateStep;

fn feature_names(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            FEATURE_RANGES
                .get(i)
                .map_or_else(|| format!("feature_{i}"), |(name, _, _)| (*name).to_string())
        })
        .collect()
}

fn category_name(class: usize) -> String {
    CATEGORY_NAMES
        .get(class)
        .map_or_else(|| format!("class_{class}"), |name| (*name).to_string())
}

impl GenerateStep {
    fn full(&self, ctx: &StepContext) -> Result<StepOutcome<DatasetShape>, PipelineError> {
        let data = &ctx.config.data;
        let spec = ClassificationSpec::new(data.n_samples, data.n_features, data.n_classes, data.random_state);
        let (mut x, y) = make_classification(&spec)?;

        for (j, (_, low, high)) in FEATURE_RANGES.iter().enumerate().take(x.ncols()) {
            rescale_column(&mut x, j, *low, *high);
        }

        let names = feature_names(data.n_features);
        let mut frame = DataFrame::from_matrix(&names, &x)?;
        let n = frame.n_rows();
        frame.insert_column(CATEGORY_COLUMN, Column::text(y.iter().map(|&c| category_name(c))))?;
        #[allow(clippy::cast_precision_loss)]
        let encoded = Column::numeric(y.iter().map(|&c| c as f64));
        frame.insert_column(TARGET_COLUMN, encoded)?;
        frame.insert_column("data_source", Column::constant_text("synthetic", n))?;
        frame.insert_column("created_at", Column::constant_text(&iso_timestamp(), n))?;
        frame.insert_column(
            "pipeline_version",
            Column::constant_text(&ctx.metadata.pipeline_version, n),
        )?;

        let metadata = ctx.artifact_metadata(json!({
            "generator": "make_classification",
            "n_informative": spec.n_informative,
            "n_redundant": spec.n_redundant,
            "class_sep": spec.class_sep,
            "flip_y": spec.flip_y,
        }));
        let (record, report) = ctx.store.write_tabular(
            &ctx.layout.raw_data,
            ArtifactKind::RawDataset,
            &frame,
            &metadata,
            StepId::Generate.label(),
        )?;

        info!(
            samples = n,
            features = names.len(),
            path = %ctx.layout.raw_data.display(),
            "Generated {n} samples with {} features", names.len()
        );

        Ok(StepOutcome::new(
            DatasetShape {
                samples: n,
                features: names.len(),
            },
            ExecutionTier::Full,
        )
        .with_artifact(record)
        .with_quality([report]))
    }

    fn degraded(&self, ctx: &StepContext) -> Result<StepOutcome<DatasetShape>, PipelineError> {
        warn!("Using mock data generation - dependencies not available");
        let data = &ctx.config.data;
        let placeholder = json!({
            "samples": data.n_samples,
            "features": data.n_features,
            "classes": data.n_classes,
            "generated_at": iso_timestamp(),
            "mock": true,
        });
        let record = ctx.store.write_placeholder(
            &ctx.layout.raw_data,
            ArtifactKind::RawDataset,
            &placeholder,
        )?;
        let report = ctx.store.gate().validate(None, StepId::Generate.label());

        Ok(StepOutcome::new(
            DatasetShape {
                samples: data.n_samples,
                features: data.n_features,
            },
            ExecutionTier::Degraded,
        )
        .with_artifact(record)
        .with_quality([report]))
    }
}

#[async_trait]
impl PipelineStep for GenerateStep {
    type Output = DatasetShape;

    fn id(&self) -> StepId {
        StepId::Generate
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        tier: ExecutionTier,
    ) -> Result<StepOutcome<DatasetShape>, PipelineError> {
        match tier {
            ExecutionTier::Full => self.full(ctx),
            ExecutionTier::Degraded => self.degraded(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names() {
        assert_eq!(feature_names(2), vec!["tempo_bpm", "energy_level"]);
        assert_eq!(feature_names(11)[10], "feature_10");
    }

    #[test]
    fn test_category_names() {
        assert_eq!(category_name(0), "relaxation");
        assert_eq!(category_name(2), "focus");
        assert_eq!(category_name(4), "class_4");
    }
}
