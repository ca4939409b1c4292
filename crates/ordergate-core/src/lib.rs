//! Core domain types for the ordergate admission pipeline.
//!
//! This crate provides the data that crosses the pipeline boundary:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `OrderRequest`, `ClientOrderId`: Proposed trades from upstream sizing
//! - `EnvironmentState`: Operating mode plus the live multi-flag gate
//! - `PortfolioState`: Read-only portfolio snapshot supplied per batch
//! - `SafetyViolation`, `RiskViolation`, `RiskCheckResult`: Structured denials
//! - `ExecutionResult`: What the pipeline hands back to the caller

pub mod decimal;
pub mod environment;
pub mod error;
pub mod execution;
pub mod order;
pub mod portfolio;
pub mod violation;

pub use decimal::{Price, Size};
pub use environment::{EnvironmentState, Routing, TradingMode};
pub use error::{CoreError, Result};
pub use order::{ClientOrderId, OrderRequest, OrderSide, OrderType};
pub use portfolio::{PortfolioState, PositionSnapshot};

pub use execution::{
    Denial, DenialStage, ExecutionFailure, ExecutionResult, Fill, OrderFate, OrderOutcome,
    OrderStatus, PipelineState, TerminalState, ViolationSummary,
};
pub use violation::{
    OrderRiskResult, RiskCategory, RiskCheckResult, RiskCode, RiskMetrics, RiskViolation,
    SafetyViolation,
};
