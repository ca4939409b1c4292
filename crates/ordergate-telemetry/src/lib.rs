//! Prometheus metrics and structured logging for ordergate.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus counters for decisions, executions and audit health

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
