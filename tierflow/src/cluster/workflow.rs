//! The workflow document handed to an orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::capabilities::requirements;
use crate::config::{ModelConfig, PipelineConfig};
use crate::core::{ArtifactLayout, StepId};

/// Run parameters exposed by the compiled workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowParams {
    /// Trees in the forest.
    pub n_estimators: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Seed.
    pub random_state: u64,
}

impl WorkflowParams {
    /// Parameters used for cluster submissions.
    #[must_use]
    pub fn submission() -> Self {
        Self {
            n_estimators: 150,
            max_depth: 15,
            random_state: 42,
        }
    }

    /// Name/value pairs in declaration order.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("n_estimators".to_string(), self.n_estimators.into()),
            ("max_depth".to_string(), self.max_depth.into()),
            ("random_state".to_string(), self.random_state.into()),
        ])
    }
}

impl From<&ModelConfig> for WorkflowParams {
    fn from(model: &ModelConfig) -> Self {
        Self {
            n_estimators: model.n_estimators,
            max_depth: model.max_depth,
            random_state: model.random_state,
        }
    }
}

/// Declared parameter with its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Default value.
    pub default: serde_json::Value,
}

/// One node of the compiled graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Steps that must finish first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Artifact paths read.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Artifact paths written.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Capabilities needed for the full tier.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Parameters consumed by the step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Workflow identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Pipeline name.
    pub name: String,
    /// Pipeline description.
    pub description: String,
    /// Pipeline version.
    pub version: String,
}

/// A compiled four-step workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    /// Document schema.
    pub api_version: String,
    /// Pipeline identity.
    pub metadata: WorkflowMetadata,
    /// Run parameters and their defaults.
    pub parameters: BTreeMap<String, ParameterSpec>,
    /// Steps in execution order.
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDocument {
    /// Compiles the fixed graph for `config`.
    #[must_use]
    pub fn compile(config: &PipelineConfig) -> Self {
        let layout = ArtifactLayout::under(&config.output_dir);
        let parameters = WorkflowParams::from(&config.model)
            .to_map()
            .into_iter()
            .map(|(name, default)| {
                (
                    name,
                    ParameterSpec {
                        kind: "integer".to_string(),
                        default,
                    },
                )
            })
            .collect();

        let steps = StepId::ALL
            .into_iter()
            .map(|step| {
                let (inputs, outputs) = layout.contract(step);
                WorkflowStep {
                    name: step.as_str().to_string(),
                    display_name: step.label().to_string(),
                    depends_on: step
                        .predecessor()
                        .map(|p| vec![p.as_str().to_string()])
                        .unwrap_or_default(),
                    inputs: inputs.iter().map(|p| p.display().to_string()).collect(),
                    outputs: outputs.iter().map(|p| p.display().to_string()).collect(),
                    requires: requirements(step)
                        .into_iter()
                        .map(|c| c.as_str().to_string())
                        .collect(),
                    parameters: if step == StepId::Train {
                        vec![
                            "n_estimators".to_string(),
                            "max_depth".to_string(),
                            "random_state".to_string(),
                        ]
                    } else {
                        Vec::new()
                    },
                }
            })
            .collect();

        Self {
            api_version: "tierflow/v1".to_string(),
            metadata: WorkflowMetadata {
                name: config.pipeline.name.clone(),
                description: config.pipeline.description.clone(),
                version: config.pipeline.version.clone(),
            },
            parameters,
            steps,
        }
    }

    /// Returns a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_steps_are_chained() {
        let doc = WorkflowDocument::compile(&PipelineConfig::default());
        let names: Vec<&str> = doc.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["generate", "preprocess", "train", "evaluate"]);

        assert!(doc.step("generate").unwrap().depends_on.is_empty());
        assert_eq!(doc.step("evaluate").unwrap().depends_on, vec!["train".to_string()]);
        assert_eq!(
            doc.step("generate").unwrap().outputs,
            doc.step("preprocess").unwrap().inputs
        );
    }

    #[test]
    fn test_parameters_follow_model_config() {
        let config = PipelineConfig::default().with_estimators(7);
        let doc = WorkflowDocument::compile(&config);
        assert_eq!(doc.parameters["n_estimators"].default, 7);
        assert_eq!(doc.parameters["max_depth"].default, 10);
        assert_eq!(doc.step("train").unwrap().parameters.len(), 3);
        assert!(doc.step("evaluate").unwrap().parameters.is_empty());
    }

    #[test]
    fn test_submission_params() {
        let params = WorkflowParams::submission().to_map();
        assert_eq!(params["n_estimators"], 150);
        assert_eq!(params["max_depth"], 15);
        assert_eq!(params["random_state"], 42);
    }
}
