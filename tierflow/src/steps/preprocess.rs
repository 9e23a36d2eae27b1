//! Feature engineering, stratified splitting and scaling.
//!
//! The scaler is fit on the train split only and applied unchanged to the
//! validation and test splits.

use async_trait::async_trait;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::{
    feature_columns, labels_from, PipelineStep, StepContext, StepOutcome, CATEGORY_COLUMN,
    TARGET_COLUMN,
};
use crate::capabilities::ExecutionTier;
use crate::core::{ArtifactKind, SplitRole, StepId};
use crate::errors::{ContractViolation, DataContractError, PipelineError};
use crate::frame::{Column, DataFrame};
use crate::ml::{stratified_split, StandardScaler};
use crate::store::{Envelope, METADATA_COLUMN};
use crate::utils::iso_timestamp;

/// Split sizes reported by the degraded tier.
pub const DEGRADED_SPLIT_SIZES: SplitSizes = SplitSizes {
    train: 800,
    validation: 100,
    test: 100,
};

/// Columns that describe a row rather than measure it. Never model inputs,
/// whatever their type.
const DESCRIPTIVE_COLUMNS: [&str; 5] = [
    CATEGORY_COLUMN,
    "data_source",
    "created_at",
    "pipeline_version",
    METADATA_COLUMN,
];

/// Rows in each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    /// Train rows.
    pub train: usize,
    /// Validation rows.
    pub validation: usize,
    /// Test rows.
    pub test: usize,
}

impl SplitSizes {
    /// Rows in `role`.
    #[must_use]
    pub fn get(&self, role: SplitRole) -> usize {
        match role {
            SplitRole::Train => self.train,
            SplitRole::Validation => self.validation,
            SplitRole::Test => self.test,
        }
    }

    /// Total rows across splits.
    #[must_use]
    pub fn total(&self) -> usize {
        self.train + self.validation + self.test
    }
}

/// Turns the raw dataset into scaled train/validation/test splits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessStep;

/// Encoded labels, preferring the numeric target and falling back to
/// label-encoding the category names.
fn target_labels(frame: &DataFrame) -> Result<Vec<usize>, DataContractError> {
    if frame.has_column(TARGET_COLUMN) {
        return labels_from(frame, TARGET_COLUMN);
    }
    match frame.column(CATEGORY_COLUMN) {
        Some(Column::Numeric(_)) => labels_from(frame, CATEGORY_COLUMN),
        Some(Column::Text(values)) => {
            let names: Vec<&str> = values
                .iter()
                .enumerate()
                .map(|(row, v)| {
                    v.as_deref().ok_or_else(|| {
                        DataContractError::new(
                            ContractViolation::NonNumeric,
                            format!("Target column '{CATEGORY_COLUMN}' is empty at row {row}"),
                        )
                    })
                })
                .collect::<Result<_, _>>()?;
            let classes: Vec<&str> = names.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
            Ok(names
                .iter()
                .map(|name| classes.iter().position(|c| c == name).unwrap_or_default())
                .collect())
        }
        None => Err(DataContractError::missing_column(CATEGORY_COLUMN)),
    }
}

fn median(values: &[Option<f64>]) -> f64 {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return 0.0;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    }
}

/// Base features with missing cells filled by the column median, followed by
/// the engineered interaction features.
fn engineer_features(frame: &DataFrame) -> Result<(Vec<String>, DataFrame), DataContractError> {
    let base: Vec<String> = feature_columns(frame, TARGET_COLUMN)
        .into_iter()
        .filter(|name| !DESCRIPTIVE_COLUMNS.contains(&name.as_str()))
        .collect();
    if let Some(name) = frame
        .text_columns()
        .into_iter()
        .find(|name| !DESCRIPTIVE_COLUMNS.contains(&name.as_str()))
    {
        return Err(DataContractError::new(
            ContractViolation::NonNumeric,
            format!("Feature column '{name}' is not numeric"),
        ));
    }
    if base.is_empty() {
        return Err(DataContractError::new(
            ContractViolation::InsufficientData,
            "Dataset has no numeric feature columns",
        ));
    }

    let mut filled: Vec<Vec<f64>> = Vec::with_capacity(base.len() + 3);
    let mut missing = 0;
    for name in &base {
        let Some(Column::Numeric(values)) = frame.column(name) else {
            continue;
        };
        let fill = median(values);
        missing += values.iter().filter(|v| v.is_none()).count();
        filled.push(values.iter().map(|v| v.unwrap_or(fill)).collect());
    }
    if missing > 0 {
        warn!(missing, "Found {missing} missing values, filling with median");
    }

    let mut names = base.clone();
    if base.len() >= 4 {
        let n = frame.n_rows();
        let col = |j: usize, i: usize| filled[j][i];
        let ratio: Vec<f64> = (0..n).map(|i| col(0, i) / (col(1, i) + 1e-8)).collect();
        let interaction: Vec<f64> = (0..n).map(|i| col(2, i) * col(1, i)).collect();
        let balance: Vec<f64> = if base.len() >= 8 {
            (0..n).map(|i| col(4, i) - col(7, i)).collect()
        } else {
            vec![0.0; n]
        };
        filled.extend([ratio, interaction, balance]);
        names.extend(
            ["tempo_energy_ratio", "valence_energy_interaction", "acoustic_speech_balance"]
                .map(String::from),
        );
    }

    let features = DataFrame::from_columns(
        names
            .iter()
            .cloned()
            .zip(filled.into_iter().map(Column::numeric)),
    )?;
    Ok((names, features))
}

impl PreprocessStep {
    fn full(&self, ctx: &StepContext) -> Result<StepOutcome<SplitSizes>, PipelineError> {
        let raw = ctx.store.read_tabular(&ctx.layout.raw_data)?;
        let input_report = ctx.store.gate().validate(Some(&raw), "Preprocessing Input");

        info!("Performing feature engineering...");
        let labels = target_labels(&raw).map_err(|e| e.with_path(&ctx.layout.raw_data))?;
        let (names, features) = engineer_features(&raw).map_err(|e| e.with_path(&ctx.layout.raw_data))?;
        let x = features.to_matrix(&names)?;

        let data = &ctx.config.data;
        let split = stratified_split(&labels, data.test_size, data.validation_size, data.random_state)?;
        let (scaler, train_x) = StandardScaler::fit_transform(&x.select(Axis(0), &split.train))?;
        let validation_x = scaler.transform(&x.select(Axis(0), &split.validation))?;
        let test_x = scaler.transform(&x.select(Axis(0), &split.test))?;

        let (train, validation, test) = split.sizes();
        let sizes = SplitSizes {
            train,
            validation,
            test,
        };
        let processing = json!({
            "processed_at": iso_timestamp(),
            "scaler_type": "StandardScaler",
            "feature_count": names.len(),
            "train_samples": train,
            "val_samples": validation,
            "test_samples": test,
        });

        let mut outcome = StepOutcome::new(sizes, ExecutionTier::Full).with_quality([input_report]);
        for (role, matrix, rows) in [
            (SplitRole::Train, &train_x, &split.train),
            (SplitRole::Validation, &validation_x, &split.validation),
            (SplitRole::Test, &test_x, &split.test),
        ] {
            let mut frame = DataFrame::from_matrix(&names, matrix)?;
            #[allow(clippy::cast_precision_loss)]
            let target = Column::numeric(rows.iter().map(|&r| labels[r] as f64));
            frame.insert_column(TARGET_COLUMN, target)?;
            frame.insert_column("split_type", Column::constant_text(role.as_str(), frame.n_rows()))?;

            let (record, report) = ctx.store.write_tabular(
                ctx.layout.split(role),
                ArtifactKind::SplitDataset(role),
                &frame,
                &ctx.artifact_metadata(processing.clone()),
                &format!("Preprocessing Output - {role}"),
            )?;
            outcome = outcome.with_artifact(record).with_quality([report]);
        }

        let n_classes = labels.iter().max().map_or(0, |m| m + 1);
        let envelope = Envelope::new(ArtifactKind::FittedTransformer, scaler)
            .with_feature_names(names.clone())
            .with_metadata(ctx.artifact_metadata(json!({
                "processing": processing,
                "fit_on": "train",
                "applied_to": ["validation", "test"],
                "target_column": TARGET_COLUMN,
                "n_classes": n_classes,
            })));
        let record = ctx.store.write_envelope(&ctx.layout.transformer, &envelope)?;

        info!(
            train,
            validation,
            test,
            features = names.len(),
            "Data preprocessing completed"
        );
        Ok(outcome.with_artifact(record))
    }

    fn degraded(&self, ctx: &StepContext) -> Result<StepOutcome<SplitSizes>, PipelineError> {
        warn!("Using mock preprocessing - dependencies not available");
        let sizes = DEGRADED_SPLIT_SIZES;
        let mut outcome = StepOutcome::new(sizes, ExecutionTier::Degraded);

        for role in SplitRole::ALL {
            let record = ctx.store.write_placeholder(
                ctx.layout.split(role),
                ArtifactKind::SplitDataset(role),
                &json!({"mock": true, "samples": sizes.get(role), "split_type": role.as_str()}),
            )?;
            let report = ctx
                .store
                .gate()
                .validate(None, &format!("Preprocessing Output - {role}"));
            outcome = outcome.with_artifact(record).with_quality([report]);
        }

        let record = ctx.store.write_placeholder(
            &ctx.layout.transformer,
            ArtifactKind::FittedTransformer,
            &json!({
                "mock": true,
                "scaler_type": "StandardScaler",
                "fit_on": "train",
                "applied_to": ["validation", "test"],
                "samples": sizes.train,
            }),
        )?;
        Ok(outcome.with_artifact(record))
    }
}

#[async_trait]
impl PipelineStep for PreprocessStep {
    type Output = SplitSizes;

    fn id(&self) -> StepId {
        StepId::Preprocess
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        tier: ExecutionTier,
    ) -> Result<StepOutcome<SplitSizes>, PipelineError> {
        match tier {
            ExecutionTier::Full => self.full(ctx),
            ExecutionTier::Degraded => self.degraded(ctx),
        }
    }
}
