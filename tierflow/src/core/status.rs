//! Step identifiers and the pipeline state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PipelineError;

/// The four steps of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    /// Synthetic data generation.
    Generate,
    /// Feature engineering, splitting and scaling.
    Preprocess,
    /// Classifier training.
    Train,
    /// Held-out evaluation.
    Evaluate,
}

impl StepId {
    /// All steps in execution order.
    pub const ALL: [Self; 4] = [Self::Generate, Self::Preprocess, Self::Train, Self::Evaluate];

    /// Returns the step name used in logs and artifacts.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Preprocess => "preprocess",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
        }
    }

    /// Returns a human-readable label for log lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generate => "Data Generation",
            Self::Preprocess => "Data Preprocessing",
            Self::Train => "Model Training",
            Self::Evaluate => "Model Evaluation",
        }
    }

    /// Returns the step that must complete before this one.
    #[must_use]
    pub fn predecessor(&self) -> Option<Self> {
        match self {
            Self::Generate => None,
            Self::Preprocess => Some(Self::Generate),
            Self::Train => Some(Self::Preprocess),
            Self::Evaluate => Some(Self::Train),
        }
    }

    /// Returns this step and every step before it, earliest first.
    #[must_use]
    pub fn lineage(&self) -> Vec<Self> {
        Self::ALL.into_iter().filter(|step| step <= self).collect()
    }

    /// Parses a step name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == name)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run currently stands.
///
/// Each state is reachable only from its immediate predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has run yet.
    #[default]
    Pending,
    /// The raw dataset exists.
    Generated,
    /// Train/validation/test splits and the scaler exist.
    Preprocessed,
    /// The model and training metrics exist.
    Trained,
    /// The evaluation report exists. Terminal.
    Evaluated,
}

impl PipelineState {
    /// Returns the state reached once `step` completes.
    #[must_use]
    pub fn after(step: StepId) -> Self {
        match step {
            StepId::Generate => Self::Generated,
            StepId::Preprocess => Self::Preprocessed,
            StepId::Train => Self::Trained,
            StepId::Evaluate => Self::Evaluated,
        }
    }

    /// Returns the step allowed to run from this state, if any.
    #[must_use]
    pub fn next_step(&self) -> Option<StepId> {
        match self {
            Self::Pending => Some(StepId::Generate),
            Self::Generated => Some(StepId::Preprocess),
            Self::Preprocessed => Some(StepId::Train),
            Self::Trained => Some(StepId::Evaluate),
            Self::Evaluated => None,
        }
    }

    /// Checks that `step` may start from this state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] for any out-of-order step.
    pub fn check(&self, step: StepId) -> Result<(), PipelineError> {
        if self.next_step() == Some(step) {
            Ok(())
        } else {
            Err(PipelineError::InvalidTransition {
                step,
                from: self.to_string(),
            })
        }
    }

    /// Moves to the state after `step`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] for any out-of-order step.
    pub fn advance(self, step: StepId) -> Result<Self, PipelineError> {
        self.check(step)?;
        Ok(Self::after(step))
    }

    /// Returns true once the run reached its terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Evaluated)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generated => write!(f, "generated"),
            Self::Preprocessed => write!(f, "preprocessed"),
            Self::Trained => write!(f, "trained"),
            Self::Evaluated => write!(f, "evaluated"),
        }
    }
}
