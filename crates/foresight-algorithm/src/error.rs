//! Scoring runner error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while running a scoring routine.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error talking to {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{address} exited with code {code:?}: {stderr}")]
    Failed {
        address: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{address} did not finish within {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("{address} produced non UTF-8 output")]
    InvalidOutput { address: String },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
