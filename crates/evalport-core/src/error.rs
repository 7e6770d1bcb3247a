use std::path::PathBuf;

use thiserror::Error;

use crate::{LayerName, SessionState};

pub type Result<T, E = EvalError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("evaluator rejected configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to load model {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationFailure),

    #[error("{op} requires a loaded model (session is {state})")]
    ModelNotLoaded { op: &'static str, state: SessionState },

    #[error("{op} called on a destroyed session")]
    UseAfterDestroy { op: &'static str },
}

impl EvalError {
    pub fn model_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvaluationFailure {
    #[error("output layer `{0}` is not part of the loaded model")]
    UnknownOutputLayer(LayerName),

    #[error("input layer `{0}` is not part of the loaded model")]
    UnknownInputLayer(LayerName),

    #[error("missing input for layer `{0}`")]
    MissingInput(LayerName),

    #[error("layer `{layer}` holds {expected} values, got {actual}")]
    ShapeMismatch {
        layer: LayerName,
        expected: usize,
        actual: usize,
    },

    #[error("no output layers requested")]
    NoOutputsRequested,

    #[error("{0}")]
    Backend(String),
}
