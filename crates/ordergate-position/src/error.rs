//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid fill: {0}")]
    InvalidFill(String),

    #[error("Failed to read portfolio snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse portfolio snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type PositionResult<T> = Result<T, PositionError>;
