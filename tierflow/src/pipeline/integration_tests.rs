//! End-to-end runs of the four-step graph.

#[cfg(test)]
mod tests {
    use ndarray::Axis;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    use crate::capabilities::{Capability, CapabilityRegistry, ExecutionTier};
    use crate::core::{ArtifactKind, PipelineState, SplitRole, StepId};
    use crate::errors::{ContractViolation, PipelineError};
    use crate::frame::{Column, DataFrame};
    use crate::ml::StandardScaler;
    use crate::pipeline::{PipelineGraph, RunSummary};
    use crate::quality::QualityStatus;
    use crate::steps::{DatasetShape, EvaluationReport, TrainingMetrics, DEGRADED_SPLIT_SIZES};
    use crate::testing::{
        degraded_registry, local_registry, test_config, tracking_with, RecordingBackend,
        RecordingEmitter, StepEvent, UnavailableBackend,
    };
    use crate::tracking::TrackingAdapter;

    fn graph(dir: &std::path::Path, registry: &CapabilityRegistry) -> PipelineGraph {
        PipelineGraph::with_tracking(test_config(dir), registry, TrackingAdapter::disabled())
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_run_reaches_evaluated() {
        let dir = tempdir().unwrap();
        let summary = graph(dir.path(), &local_registry()).execute().await.unwrap();

        assert_eq!(summary.state, PipelineState::Evaluated);
        assert!(!summary.degraded());
        assert_eq!(
            summary.dataset,
            Some(DatasetShape {
                samples: 1000,
                features: 10
            })
        );

        let splits = summary.splits.unwrap();
        assert_eq!((splits.train, splits.validation, splits.test), (700, 100, 200));

        let training = summary.training.clone().unwrap();
        assert!((0.0..=1.0).contains(&training.accuracy));
        assert_eq!(training.run_id, summary.metadata.run_id.to_string());

        let evaluation = summary.evaluation.unwrap();
        assert!((0.0..=1.0).contains(&evaluation.accuracy));
        assert!((0.0..=1.0).contains(&evaluation.precision));
    }

    #[tokio::test]
    async fn test_full_run_artifacts() {
        let dir = tempdir().unwrap();
        let graph = graph(dir.path(), &local_registry());
        let store = graph.context().store;
        let layout = graph.context().layout.clone();
        let summary = graph.execute().await.unwrap();

        let report: EvaluationReport = store.read_json(&layout.evaluation).unwrap();
        assert!(!report.mock);
        assert_eq!(report.run_id, summary.metadata.run_id.to_string());
        let classes = report.classification_report.unwrap();
        assert_eq!(classes.classes.len(), 3);
        assert!((classes.accuracy - report.accuracy).abs() < 1e-12);

        let metrics: TrainingMetrics = store.read_json(&layout.train_metrics).unwrap();
        assert_eq!(metrics.model_version, metrics.run_id);

        let raw = store.read_tabular(&layout.raw_data).unwrap();
        let meta = raw.column("processing_metadata").unwrap().str_at(0).unwrap();
        let meta: serde_json::Value = serde_json::from_str(meta).unwrap();
        assert_eq!(meta["run_id"], summary.metadata.run_id.to_string());
        let source = raw.column("data_source").unwrap();
        assert!((0..raw.n_rows()).all(|row| source.str_at(row) == Some("synthetic")));

        let manifest: RunSummary = store.read_json(&layout.manifest).unwrap();
        assert_eq!(manifest.state, PipelineState::Evaluated);
        assert_eq!(manifest.steps.len(), 4);

        let generate = summary.step(StepId::Generate).unwrap();
        assert_eq!(generate.quality[0].status, QualityStatus::Passed);
        assert_eq!(generate.artifacts[0].kind, ArtifactKind::RawDataset);
        assert!(generate.artifacts.iter().all(|a| !a.placeholder));
    }

    #[tokio::test]
    async fn test_scaler_fit_on_train_only() {
        let dir = tempdir().unwrap();
        let mut graph = graph(dir.path(), &local_registry());
        graph.run_next().await.unwrap();
        graph.run_next().await.unwrap();
        assert_eq!(graph.state(), PipelineState::Preprocessed);

        let ctx = graph.context();
        let envelope = ctx
            .store
            .read_envelope::<StandardScaler>(&ctx.layout.transformer, ArtifactKind::FittedTransformer)
            .unwrap();
        assert_eq!(envelope.metadata["fit_on"], "train");
        assert_eq!(envelope.metadata["applied_to"], json!(["validation", "test"]));
        assert_eq!(envelope.payload.n_samples_seen, 700);
        assert_eq!(envelope.feature_names.len(), 13);

        let train = ctx.store.read_tabular(ctx.layout.split(SplitRole::Train)).unwrap();
        let x = train.to_matrix(&envelope.feature_names).unwrap();
        let means = x.mean_axis(Axis(0)).unwrap();
        let stds = x.std_axis(Axis(0), 0.0);
        assert!(means.iter().all(|m| m.abs() < 1e-6));
        assert!(stds.iter().all(|s| (s - 1.0).abs() < 1e-6));

        // Refitting the held-out splits would yield different parameters.
        let test = ctx.store.read_tabular(ctx.layout.split(SplitRole::Test)).unwrap();
        let held_out = test.to_matrix(&envelope.feature_names).unwrap();
        let test_means = held_out.mean_axis(Axis(0)).unwrap();
        assert!(test_means.iter().any(|m| m.abs() > 1e-6));
        let reloaded = ctx
            .store
            .read_envelope::<StandardScaler>(&ctx.layout.transformer, ArtifactKind::FittedTransformer)
            .unwrap();
        assert_eq!(reloaded.payload, envelope.payload);
    }

    #[tokio::test]
    async fn test_degraded_run_writes_placeholders() {
        let dir = tempdir().unwrap();
        let graph = graph(dir.path(), &degraded_registry());
        assert!(graph.plan().values().all(|t| *t == ExecutionTier::Degraded));
        let store = graph.context().store;
        let layout = graph.context().layout.clone();
        let summary = graph.execute().await.unwrap();

        assert_eq!(summary.state, PipelineState::Evaluated);
        assert_eq!(
            summary.dataset,
            Some(DatasetShape {
                samples: 1000,
                features: 10
            })
        );
        assert_eq!(summary.splits, Some(DEGRADED_SPLIT_SIZES));
        assert!(summary.degraded());

        for step in &summary.steps {
            assert_eq!(step.tier, ExecutionTier::Degraded);
            assert!(step.artifacts.iter().all(|a| a.placeholder));
            for path in step.artifacts.iter().map(|a| &a.path) {
                let value: serde_json::Value = store.read_json(path).unwrap();
                assert_eq!(value["mock"], true, "{}", path.display());
            }
            assert!(step.quality.iter().all(|q| q.status == QualityStatus::Skipped));
        }

        let report: EvaluationReport = store.read_json(&layout.evaluation).unwrap();
        assert!(report.mock);
        assert!(report.classification_report.is_none());
        let transformer: serde_json::Value = store.read_json(&layout.transformer).unwrap();
        assert_eq!(transformer["fit_on"], "train");
    }

    #[tokio::test]
    async fn test_missing_numeric_engine_degrades_whole_chain() {
        let dir = tempdir().unwrap();
        let registry = CapabilityRegistry::without(&[Capability::NumericEngine]);
        let summary = graph(dir.path(), &registry).execute().await.unwrap();
        assert!(summary.steps.iter().all(|s| s.tier == ExecutionTier::Degraded));
        assert_eq!(summary.state, PipelineState::Evaluated);
    }

    #[tokio::test]
    async fn test_unavailable_tracking_does_not_change_results() {
        let offline = tempdir().unwrap();
        let baseline = PipelineGraph::with_tracking(
            test_config(offline.path()),
            &CapabilityRegistry::all_available(),
            tracking_with(Arc::new(UnavailableBackend::new())),
        )
        .unwrap()
        .execute()
        .await
        .unwrap();

        let hanging = tempdir().unwrap();
        let slow = PipelineGraph::with_tracking(
            test_config(hanging.path()),
            &CapabilityRegistry::all_available(),
            tracking_with(Arc::new(UnavailableBackend::hanging(Duration::from_secs(5)))),
        )
        .unwrap()
        .execute()
        .await
        .unwrap();

        let local = tempdir().unwrap();
        let untracked = graph(local.path(), &local_registry()).execute().await.unwrap();

        let accuracy = |s: &RunSummary| s.training.as_ref().map(|t| t.accuracy);
        assert_eq!(accuracy(&baseline), accuracy(&untracked));
        assert_eq!(accuracy(&slow), accuracy(&untracked));
        assert_eq!(
            baseline.training.unwrap().run_id,
            baseline.metadata.run_id.to_string()
        );
        assert_eq!(slow.state, PipelineState::Evaluated);
    }

    #[tokio::test]
    async fn test_tracking_mirrors_local_results() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let graph = PipelineGraph::with_tracking(
            test_config(dir.path()),
            &CapabilityRegistry::all_available(),
            tracking_with(backend.clone()),
        )
        .unwrap();
        let store = graph.context().store;
        let layout = graph.context().layout.clone();
        let summary = graph.execute().await.unwrap();

        assert_eq!(backend.run_count(), 2);
        assert_eq!(backend.model_artifacts().len(), 1);
        let metrics: TrainingMetrics = store.read_json(&layout.train_metrics).unwrap();
        assert_eq!(metrics.model_version, "1");
        assert_eq!(metrics.run_id, summary.metadata.run_id.to_string());
        assert_eq!(
            backend.metric("train_accuracy"),
            vec![summary.training.unwrap().accuracy]
        );
        let evaluation = summary.evaluation.unwrap();
        assert_eq!(backend.metric("test_accuracy"), vec![evaluation.accuracy]);
        assert_eq!(backend.metric("test_precision"), vec![evaluation.precision]);
        assert_eq!(backend.param("n_estimators").as_deref(), Some("20"));
        assert_eq!(backend.param("tier").as_deref(), Some("full"));
    }

    #[tokio::test]
    async fn test_degraded_training_registers_no_model() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let graph = PipelineGraph::with_tracking(
            test_config(dir.path()),
            &degraded_registry(),
            tracking_with(backend.clone()),
        )
        .unwrap();
        let store = graph.context().store;
        let layout = graph.context().layout.clone();
        let summary = graph.execute().await.unwrap();

        assert_eq!(summary.state, PipelineState::Evaluated);
        assert_eq!(backend.run_count(), 2);
        assert!(backend.model_artifacts().is_empty());
        assert_eq!(backend.param("tier").as_deref(), Some("degraded"));

        let metrics: TrainingMetrics = store.read_json(&layout.train_metrics).unwrap();
        assert!(metrics.mock);
        assert_eq!(metrics.model_version, metrics.run_id);
    }

    #[tokio::test]
    async fn test_contract_violation_aborts_run() {
        let dir = tempdir().unwrap();
        let emitter = Arc::new(RecordingEmitter::new());
        let mut graph = graph(dir.path(), &local_registry()).with_emitter(emitter.clone());

        assert_eq!(graph.run_next().await.unwrap(), Some(StepId::Generate));

        let ctx = graph.context().clone();
        let frame = DataFrame::from_columns([
            ("tempo_bpm".to_string(), Column::numeric([100.0, 120.0])),
            ("energy_level".to_string(), Column::numeric([0.2, 0.4])),
        ])
        .unwrap();
        ctx.store
            .write_tabular(&ctx.layout.raw_data, ArtifactKind::RawDataset, &frame, &json!({}), "tampered")
            .unwrap();

        let err = graph.run_next().await.unwrap_err();
        match &err {
            PipelineError::DataContract(contract) => {
                assert_eq!(contract.kind, ContractViolation::MissingColumn);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(graph.state(), PipelineState::Generated);
        assert!(!ctx.layout.train_data.exists());
        assert!(matches!(
            emitter.events().last(),
            Some(StepEvent::Failed(StepId::Preprocess, ExecutionTier::Full, _))
        ));

        let err = graph.execute().await.unwrap_err();
        assert!(err.is_data_contract());
        assert!(!ctx.layout.model.exists());
        assert!(!ctx.layout.manifest.exists());
    }

    #[tokio::test]
    async fn test_malformed_model_aborts_evaluation() {
        let dir = tempdir().unwrap();
        let mut graph = graph(dir.path(), &local_registry());
        for _ in 0..3 {
            graph.run_next().await.unwrap();
        }
        let ctx = graph.context().clone();
        std::fs::write(&ctx.layout.model, b"not an envelope").unwrap();

        let err = graph.run_next().await.unwrap_err();
        assert_eq!(err.code(), "CONTRACT-MALFORMED");
        assert_eq!(graph.state(), PipelineState::Trained);
        assert!(!ctx.layout.evaluation.exists());
    }

    #[tokio::test]
    async fn test_emitter_sees_every_step_in_order() {
        let dir = tempdir().unwrap();
        let emitter = Arc::new(RecordingEmitter::new());
        graph(dir.path(), &degraded_registry())
            .with_emitter(emitter.clone())
            .execute()
            .await
            .unwrap();

        let completed: Vec<StepId> = emitter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                StepEvent::Completed(step, _) => Some(step),
                _ => None,
            })
            .collect();
        assert_eq!(completed, StepId::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_terminal_graph_runs_nothing() {
        let dir = tempdir().unwrap();
        let mut graph = graph(dir.path(), &degraded_registry());
        while graph.run_next().await.unwrap().is_some() {}
        assert!(graph.state().is_terminal());
        assert_eq!(graph.run_next().await.unwrap(), None);
    }
}
