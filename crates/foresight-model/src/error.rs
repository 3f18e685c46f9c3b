//! Prediction error types.

use std::num::ParseIntError;

use thiserror::Error;

use foresight_algorithm::RunnerError;

/// Errors returned by prediction models.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// The strategy-specific config block is absent.
    #[error("no {model_type} configuration provided for model")]
    MissingConfig { model_type: &'static str },

    /// The scoring routine failed or could not be run.
    #[error("scoring routine failed: {0}")]
    ExternalExecution(#[from] RunnerError),

    /// The scoring routine ran but its output is not a replica count.
    #[error("scoring routine returned {output:?}, expected an integer: {source}")]
    InvalidResult {
        output: String,
        #[source]
        source: ParseIntError,
    },

    #[error("unknown model type: {0}")]
    UnknownModel(String),
}

pub type PredictionResult<T> = Result<T, PredictionError>;
