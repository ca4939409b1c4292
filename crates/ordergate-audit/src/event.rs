//! Audit event record.

use chrono::{DateTime, Utc};
use ordergate_core::{
    ClientOrderId, Denial, DenialStage, RiskMetrics, Routing, TerminalState, ViolationSummary,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where in the pipeline the event was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStage {
    /// One per invocation, after the batch decision.
    Pipeline,
    /// One per order that reached an executor.
    Execution,
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => f.write_str("pipeline"),
            Self::Execution => f.write_str("execution"),
        }
    }
}

/// Why one order of a batch stopped before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDecision {
    pub order_index: usize,
    pub client_id: ClientOrderId,
    pub stage: DenialStage,
    pub code: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl OrderDecision {
    pub fn denied(order_index: usize, client_id: ClientOrderId, denial: &Denial) -> Self {
        Self {
            order_index,
            client_id,
            stage: denial.stage,
            code: denial.code.clone(),
            reason: denial.reason.clone(),
            retry_after_ms: denial.retry_after_ms,
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stage: AuditStage,
    pub batch_id: String,
    /// Effective mode label; `live_dry_run` marks a downgraded live batch.
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientOrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Routing>,
    pub input_summary: String,
    pub decision: TerminalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub downgraded: bool,
    #[serde(default, skip_serializing_if = "ViolationSummary::is_empty")]
    pub violations: ViolationSummary,
    /// Every denied order of the batch, in input order. Top-level only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<OrderDecision>,
    /// Risk inputs and projections of the batch. Top-level only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_metrics: Option<RiskMetrics>,
}

impl AuditEvent {
    fn base(
        stage: AuditStage,
        batch_id: &str,
        mode: &str,
        input_summary: String,
        decision: TerminalState,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            stage,
            batch_id: batch_id.to_string(),
            mode: mode.to_string(),
            client_id: None,
            route: None,
            input_summary,
            decision,
            code: None,
            reason: None,
            retries: 0,
            downgraded: false,
            violations: ViolationSummary::default(),
            decisions: Vec::new(),
            risk_metrics: None,
        }
    }

    /// Top-level event for a batch.
    pub fn pipeline(
        batch_id: &str,
        mode: &str,
        input_summary: String,
        decision: TerminalState,
    ) -> Self {
        Self::base(AuditStage::Pipeline, batch_id, mode, input_summary, decision)
    }

    /// Per-order execution event.
    pub fn execution(
        batch_id: &str,
        mode: &str,
        client_id: ClientOrderId,
        route: Routing,
        input_summary: String,
        decision: TerminalState,
    ) -> Self {
        let mut event = Self::base(AuditStage::Execution, batch_id, mode, input_summary, decision);
        event.client_id = Some(client_id);
        event.route = Some(route);
        event
    }

    #[must_use]
    pub fn with_reason(mut self, code: Option<String>, reason: Option<String>) -> Self {
        self.code = code;
        self.reason = reason;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_downgraded(mut self, downgraded: bool) -> Self {
        self.downgraded = downgraded;
        self
    }

    #[must_use]
    pub fn with_violations(mut self, violations: ViolationSummary) -> Self {
        self.violations = violations;
        self
    }

    #[must_use]
    pub fn with_decisions(mut self, decisions: Vec<OrderDecision>) -> Self {
        self.decisions = decisions;
        self
    }

    #[must_use]
    pub fn with_risk_metrics(mut self, metrics: Option<RiskMetrics>) -> Self {
        self.risk_metrics = metrics;
        self
    }

    /// Decision recorded for the order at `index`, if it was denied.
    pub fn decision_for(&self, index: usize) -> Option<&OrderDecision> {
        self.decisions.iter().find(|d| d.order_index == index)
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
