use crate::error::AppError;
use crate::infrastructure::repositories::{StorageError, SynthesisError};
use serde::Serialize;

/// A unit whose synthesis failed, kept when the run records failures instead of stopping.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub language: String,
    pub row: usize,
    pub key: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("input unreadable: {0}")]
    InputUnreadable(String),
    #[error("invalid survey id: {0:?}")]
    InvalidSurveyId(String),
    #[error("synthesis failed for {language} row {row} (key {key}): {source}")]
    SynthesisFailure {
        language: String,
        row: usize,
        key: String,
        #[source]
        source: SynthesisError,
    },
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),
    #[error("mapping serialization failed: {0}")]
    MappingSerializationFailure(String),
    #[error("key {key} produced by {first} and {second}")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },
    #[error("run incomplete: {} unit(s) failed", failures.len())]
    Incomplete { failures: Vec<UnitFailure> },
    #[error("run cancelled")]
    Cancelled,
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InputUnreadable(_)
            | PipelineError::InvalidSurveyId(_)
            | PipelineError::KeyCollision { .. } => AppError::BadRequest(err.to_string()),
            PipelineError::SynthesisFailure { .. } | PipelineError::Incomplete { .. } => {
                AppError::ExternalService(err.to_string())
            }
            PipelineError::Cancelled => AppError::Unavailable(err.to_string()),
            PipelineError::StorageFailure(_) | PipelineError::MappingSerializationFailure(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
