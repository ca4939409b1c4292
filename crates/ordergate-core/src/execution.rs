//! Execution outcomes and pipeline bookkeeping.
//!
//! This module provides types for:
//! - Fills and executor-side order status
//! - Per-order fate (denied, filled, failed)
//! - Pipeline states and their legal transitions
//! - The `ExecutionResult` handed back to the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::decimal::{Price, Size};
use crate::environment::Routing;
use crate::order::{ClientOrderId, OrderSide};
use crate::violation::RiskCheckResult;

// ============================================================================
// Executor-side Types
// ============================================================================

/// Order status as tracked by an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Executor has never seen this id.
    Unknown,
    /// Submitted, awaiting a terminal answer.
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Failed
        )
    }
}

/// A fill, real or synthetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub client_id: ClientOrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub requested_quantity: Size,
    pub filled_quantity: Size,
    pub price: Price,
    pub route: Routing,
    /// True for every fill that did not move real capital.
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_order_id: Option<String>,
    /// Total submission attempts, including the successful one.
    pub attempts: u32,
    pub filled_at: DateTime<Utc>,
}

impl Fill {
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.filled_quantity < self.requested_quantity
    }
}

/// Terminal executor failure, flattened for results and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub attempts: u32,
}

impl ExecutionFailure {
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

// ============================================================================
// Per-order Outcome
// ============================================================================

/// Stage that produced a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialStage {
    Safety,
    Risk,
}

impl fmt::Display for DenialStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safety => f.write_str("safety"),
            Self::Risk => f.write_str("risk"),
        }
    }
}

/// Structured denial: machine code plus human reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub stage: DenialStage,
    pub code: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// What happened to one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fate", rename_all = "snake_case")]
pub enum OrderFate {
    Denied(Denial),
    Filled(Fill),
    Failed(ExecutionFailure),
}

/// Outcome for one order in a batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_index: usize,
    pub client_id: ClientOrderId,
    pub symbol: String,
    /// Route actually used; absent when the order never reached execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Routing>,
    /// Live placement was downgraded to a simulated fill.
    #[serde(default)]
    pub downgraded: bool,
    pub fate: OrderFate,
    /// Observe-only violations the order proceeded despite.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl OrderOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self.fate, OrderFate::Denied(_))
    }

    pub fn fill(&self) -> Option<&Fill> {
        match &self.fate {
            OrderFate::Filled(fill) => Some(fill),
            _ => None,
        }
    }

    pub fn denial(&self) -> Option<&Denial> {
        match &self.fate {
            OrderFate::Denied(denial) => Some(denial),
            _ => None,
        }
    }

    /// Whether the executor was invoked for this order.
    pub fn reached_execution(&self) -> bool {
        !self.is_denied()
    }
}

/// Counts of violations keyed by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationSummary(BTreeMap<String, usize>);

impl ViolationSummary {
    pub fn record(&mut self, category: &str) {
        *self.0.entry(category.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &ViolationSummary) {
        for (category, count) in &other.0 {
            *self.0.entry(category.clone()).or_insert(0) += count;
        }
    }

    pub fn get(&self, category: &str) -> usize {
        self.0.get(category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ============================================================================
// Pipeline State Machine
// ============================================================================

/// Pipeline stages. `DeniedSafety`, `DeniedRisk`, `Executed`,
/// `PartiallyExecuted`, `ExecutionFailed` and `Done` are terminal for the
/// decision; `Audited` follows every decision terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    EnvironmentChecked,
    SafetyEvaluated,
    DeniedSafety,
    RiskChecked,
    DeniedRisk,
    Executing,
    Executed,
    PartiallyExecuted,
    ExecutionFailed,
    Audited,
    Done,
}

impl PipelineState {
    /// Legal transitions.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Received, EnvironmentChecked)
                | (EnvironmentChecked, SafetyEvaluated)
                | (SafetyEvaluated, DeniedSafety)
                | (SafetyEvaluated, RiskChecked)
                | (RiskChecked, DeniedRisk)
                | (RiskChecked, Executing)
                | (Executing, Executed)
                | (Executing, PartiallyExecuted)
                | (Executing, ExecutionFailed)
                | (DeniedSafety, Audited)
                | (DeniedRisk, Audited)
                | (Executed, Audited)
                | (PartiallyExecuted, Audited)
                | (ExecutionFailed, Audited)
                | (Audited, Done)
        )
    }

    /// Decision terminals, the states that precede `Audited`.
    pub fn is_decision_terminal(&self) -> bool {
        matches!(
            self,
            Self::DeniedSafety
                | Self::DeniedRisk
                | Self::Executed
                | Self::PartiallyExecuted
                | Self::ExecutionFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::EnvironmentChecked => "environment_checked",
            Self::SafetyEvaluated => "safety_evaluated",
            Self::DeniedSafety => "denied_safety",
            Self::RiskChecked => "risk_checked",
            Self::DeniedRisk => "denied_risk",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::PartiallyExecuted => "partially_executed",
            Self::ExecutionFailed => "execution_failed",
            Self::Audited => "audited",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-level decision terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    DeniedSafety,
    DeniedRisk,
    Executed,
    PartiallyExecuted,
    ExecutionFailed,
}

impl From<TerminalState> for PipelineState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::DeniedSafety => Self::DeniedSafety,
            TerminalState::DeniedRisk => Self::DeniedRisk,
            TerminalState::Executed => Self::Executed,
            TerminalState::PartiallyExecuted => Self::PartiallyExecuted,
            TerminalState::ExecutionFailed => Self::ExecutionFailed,
        }
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&PipelineState::from(*self), f)
    }
}

// ============================================================================
// Execution Result
// ============================================================================

/// Everything the pipeline returns for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub batch_id: String,
    /// Effective mode label (`paper`, `testnet`, `live`, `live_dry_run`).
    pub mode: String,
    /// True when the batch had orders and none reached execution.
    pub rejected: bool,
    /// Top-level reason: the first denial in input order, else the first
    /// execution failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub terminal: TerminalState,
    /// Absent when every order was stopped at the safety stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskCheckResult>,
    pub outcomes: Vec<OrderOutcome>,
    /// Violation counts by category across safety and risk.
    pub summary: ViolationSummary,
    pub trace: Vec<PipelineState>,
    /// Audit events a sink failed to record for this batch.
    #[serde(default)]
    pub audit_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn denied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_denied()).count()
    }

    pub fn has_denials(&self) -> bool {
        self.denied_count() > 0
    }

    pub fn fills(&self) -> impl Iterator<Item = &Fill> {
        self.outcomes.iter().filter_map(OrderOutcome::fill)
    }

    pub fn executed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.reached_execution()).count()
    }

    pub fn outcome(&self, index: usize) -> Option<&OrderOutcome> {
        self.outcomes.iter().find(|o| o.order_index == index)
    }
}
