//! Pipeline construction errors.
//!
//! Running a batch never fails; denials and executor failures are values
//! inside `ExecutionResult`.

use ordergate_risk::RiskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Risk configuration rejected: {0}")]
    Risk(#[from] RiskError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
