//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Risk error: {0}")]
    Risk(#[from] ordergate_risk::RiskError),

    #[error("Executor error: {0}")]
    Executor(#[from] ordergate_executor::ExecutorError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] ordergate_pipeline::PipelineError),

    #[error("Portfolio error: {0}")]
    Position(#[from] ordergate_position::PositionError),

    #[error("Audit error: {0}")]
    Audit(#[from] ordergate_audit::AuditError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] ordergate_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
