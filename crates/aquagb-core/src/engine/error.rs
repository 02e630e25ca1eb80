use thiserror::Error;

use crate::core::models::solute::ModelBuildError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model construction failed: {source}")]
    Model {
        #[from]
        source: ModelBuildError,
    },

    #[error("coordinate array has length {got}, expected {expected}")]
    CoordinateLength { expected: usize, got: usize },

    #[error("unknown structure handle")]
    UnknownStructure,

    #[error("water-site placement failed for atom {atom}: {reason}")]
    Placement { atom: usize, reason: String },

    #[error("evaluation stage '{stage}' failed: {reason}")]
    Stage { stage: &'static str, reason: String },
}
