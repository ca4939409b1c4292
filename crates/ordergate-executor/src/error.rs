//! Executor error types.
//!
//! | Retryable | Terminal |
//! |-----------|----------|
//! | `Network` | `Auth` (disables a live executor for the session) |
//! | `Timeout` | `Rejected` (order-scoped) |
//! | `RateLimited` | `Disabled`, `UnknownOrder`, `Unsupported` |
//! | | `Unreconciled` (venue accepted, fill price unknown) |

use ordergate_core::ExecutionFailure;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Venue call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Executor disabled: {0}")]
    Disabled(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The venue took the order but the fill cannot be booked locally.
    #[error("Order needs reconciliation: {0}")]
    Unreconciled(String),

    #[error("{source} (after {attempts} attempts)")]
    AfterRetries {
        attempts: u32,
        #[source]
        source: Box<ExecutorError>,
    },
}

impl ExecutorError {
    /// Innermost error, unwrapping retry bookkeeping.
    #[must_use]
    pub fn root(&self) -> &ExecutorError {
        match self {
            Self::AfterRetries { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.root() {
            Self::Network(_) => "EXEC_NETWORK",
            Self::Timeout { .. } => "EXEC_TIMEOUT",
            Self::Auth(_) => "EXEC_AUTH",
            Self::Rejected(_) => "EXEC_REJECTED",
            Self::RateLimited { .. } => "EXEC_RATE_LIMITED",
            Self::Disabled(_) => "EXEC_DISABLED",
            Self::UnknownOrder(_) => "EXEC_UNKNOWN_ORDER",
            Self::Unsupported(_) => "EXEC_UNSUPPORTED",
            Self::Unreconciled(_) => "EXEC_NEEDS_RECONCILIATION",
            Self::AfterRetries { .. } => "EXEC_RETRIES_EXHAUSTED",
        }
    }

    /// Whether another attempt may succeed. An error that already carries a
    /// spent retry budget is never retryable again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::AfterRetries { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// Attach the attempt count once a retry loop gives up.
    #[must_use]
    pub fn after_attempts(self, attempts: u32) -> Self {
        if attempts <= 1 {
            self
        } else {
            Self::AfterRetries {
                attempts,
                source: Box::new(self),
            }
        }
    }

    /// Flatten into the per-order failure record.
    #[must_use]
    pub fn to_failure(&self) -> ExecutionFailure {
        ExecutionFailure {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.root().is_retryable(),
            attempts: self.attempts(),
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExecutorError::Network("reset".into()).is_retryable());
        assert!(ExecutorError::Timeout { after_ms: 10 }.is_retryable());
        assert!(ExecutorError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(!ExecutorError::Auth("bad key".into()).is_retryable());
        assert!(!ExecutorError::Rejected("min size".into()).is_retryable());
    }

    #[test]
    fn test_after_attempts_keeps_root_code() {
        let err = ExecutorError::Timeout { after_ms: 50 }.after_attempts(3);
        assert_eq!(err.code(), "EXEC_TIMEOUT");
        assert_eq!(err.attempts(), 3);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("after 3 attempts"));

        let failure = err.to_failure();
        assert!(failure.retryable);
        assert_eq!(failure.retries(), 2);
    }

    #[test]
    fn test_unreconciled_is_terminal() {
        let err = ExecutorError::Unreconciled("no price".into()).after_attempts(2);
        assert_eq!(err.code(), "EXEC_NEEDS_RECONCILIATION");
        assert!(!err.to_failure().retryable);
    }

    #[test]
    fn test_single_attempt_not_wrapped() {
        let err = ExecutorError::Auth("x".into()).after_attempts(1);
        assert_eq!(err, ExecutorError::Auth("x".into()));
        assert_eq!(err.attempts(), 1);
    }
}
