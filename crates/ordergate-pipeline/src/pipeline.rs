//! Batch orchestration.
//!
//! Per order the stages run strictly SafetyGate, RiskAdmissionControl,
//! execution, audit. Orders denied at one stage are drained to an outcome
//! and never reach the next; independent orders in the batch continue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use ordergate_audit::{AuditEvent, AuditSink, DynAuditSink, OrderDecision};
use ordergate_core::{
    ClientOrderId, Denial, DenialStage, EnvironmentState, ExecutionResult, OrderFate,
    OrderOutcome, OrderRequest, OrderStatus, PipelineState, PortfolioState, RiskCheckResult,
    Routing, TerminalState, ViolationSummary,
};
use ordergate_executor::{
    DynOrderExecutor, ExecutorError, ExecutorResult, OrderExecutor, SimulatedExecutor,
};
use ordergate_position::{DynPortfolioProvider, PortfolioProvider};
use ordergate_risk::{
    RiskAdmissionControl, RiskLimitsConfig, SafetyClearance, SafetyGate, SharedEnvironment,
};
use ordergate_telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::trace::StateTrace;

/// Code used when a risk implementation returns no verdict for an order.
const RISK_RESULT_MISSING: &str = "RISK_RESULT_MISSING";

/// Orders listed by name in the top-level audit summary.
const SUMMARY_ORDER_LIMIT: usize = 10;

// ============================================================================
// Stages
// ============================================================================

/// Borrowed stage implementations for one batch.
#[derive(Clone, Copy)]
pub struct Stages<'a> {
    pub gate: &'a dyn SafetyGate,
    pub risk: &'a dyn RiskAdmissionControl,
    pub limits: &'a RiskLimitsConfig,
    /// Route the safety gate evaluates. Normally the executor's route; in
    /// preview it stays the configured route while fills are simulated.
    pub intent: Routing,
    /// Every cleared order runs on `simulated`, whatever its route.
    pub preview: bool,
    /// Executor for the configured route.
    pub executor: &'a dyn OrderExecutor,
    /// Target of orders the gate downgraded to a simulated fill.
    pub simulated: &'a dyn OrderExecutor,
    pub audit: &'a dyn AuditSink,
}

impl<'a> Stages<'a> {
    /// Route an admitted order actually takes.
    fn execution_route(&self, cleared: Routing) -> Routing {
        if self.preview {
            Routing::Simulated
        } else {
            cleared
        }
    }

    fn executor_for(&self, route: Routing) -> Option<&'a dyn OrderExecutor> {
        if self.executor.route() == route {
            Some(self.executor)
        } else if route == Routing::Simulated {
            Some(self.simulated)
        } else {
            None
        }
    }
}

/// Per-batch bookkeeping shared by the stage helpers.
struct Batch<'a> {
    id: String,
    mode: &'static str,
    trace: StateTrace,
    audit: &'a dyn AuditSink,
    audit_failures: usize,
}

impl Batch<'_> {
    /// Best-effort append; a sink error is logged and counted, never raised.
    fn record(&mut self, event: &AuditEvent) {
        if let Err(e) = self.audit.record(event) {
            self.audit_failures += 1;
            Metrics::audit_failure();
            warn!(
                batch_id = %self.id,
                stage = %event.stage,
                error = %e,
                "Audit sink failed, event dropped"
            );
        }
    }
}

/// An order that cleared both decision stages.
struct Admitted {
    index: usize,
    clearance: SafetyClearance,
    warnings: Vec<String>,
}

fn denied_outcome(
    index: usize,
    order: &OrderRequest,
    id: &ClientOrderId,
    denial: Denial,
) -> OrderOutcome {
    OrderOutcome {
        order_index: index,
        client_id: id.clone(),
        symbol: order.symbol.clone(),
        route: None,
        downgraded: false,
        fate: OrderFate::Denied(denial),
        warnings: Vec::new(),
    }
}

/// Risk indices refer to the cleared subset; rewrite them to batch indices.
fn remap_indices(result: &mut RiskCheckResult, cleared: &[(usize, SafetyClearance)]) {
    let to_batch = |local: usize| cleared.get(local).map_or(local, |(index, _)| *index);
    for order in &mut result.orders {
        order.order_index = to_batch(order.order_index);
    }
    for violation in &mut result.violations {
        violation.order_index = to_batch(violation.order_index);
    }
}

fn input_summary(orders: &[OrderRequest]) -> String {
    let mut parts: Vec<String> = orders
        .iter()
        .take(SUMMARY_ORDER_LIMIT)
        .map(OrderRequest::summary)
        .collect();
    if orders.len() > SUMMARY_ORDER_LIMIT {
        parts.push(format!("+{} more", orders.len() - SUMMARY_ORDER_LIMIT));
    }
    format!("{} order(s): {}", orders.len(), parts.join("; "))
}

// ============================================================================
// execute_with_safety
// ============================================================================

/// Run one batch against fixed environment and portfolio snapshots.
///
/// Never fails: denials, executor failures and audit losses are all
/// reported inside the returned `ExecutionResult`. Orders without a client
/// id get a generated one; the caller's slice is left untouched.
pub async fn execute_with_safety(
    orders: &[OrderRequest],
    env: &EnvironmentState,
    portfolio: &PortfolioState,
    stages: &Stages<'_>,
) -> ExecutionResult {
    let started_at = Utc::now();
    let clock = Instant::now();
    let mut batch = Batch {
        id: Uuid::new_v4().to_string(),
        mode: env.mode_label(),
        trace: StateTrace::new(),
        audit: stages.audit,
        audit_failures: 0,
    };

    let orders: Vec<OrderRequest> = orders
        .iter()
        .map(|order| match order.client_id {
            Some(_) => order.clone(),
            None => order.clone().with_client_id(ClientOrderId::new()),
        })
        .collect();
    let ids: Vec<ClientOrderId> = orders
        .iter()
        .map(|order| order.client_id.clone().unwrap_or_default())
        .collect();

    batch.trace.advance(PipelineState::EnvironmentChecked);
    debug!(batch_id = %batch.id, mode = batch.mode, orders = orders.len(), "Batch received");

    let mut slots: Vec<Option<OrderOutcome>> = vec![None; orders.len()];
    let mut summary = ViolationSummary::default();

    // ------------------------------------------------------------------
    // Safety
    // ------------------------------------------------------------------
    let intent = stages.intent;
    let mut cleared: Vec<(usize, SafetyClearance)> = Vec::with_capacity(orders.len());
    for (index, order) in orders.iter().enumerate() {
        match stages.gate.evaluate(env, order, intent) {
            Ok(clearance) => cleared.push((index, clearance)),
            Err(violation) => {
                summary.record(violation.category());
                Metrics::denied("safety", violation.code());
                info!(
                    batch_id = %batch.id,
                    client_id = %ids[index],
                    code = violation.code(),
                    reason = %violation,
                    "Order denied by safety gate"
                );
                let denial = Denial {
                    stage: DenialStage::Safety,
                    code: violation.code().to_string(),
                    reason: violation.reason(),
                    retry_after_ms: None,
                };
                slots[index] = Some(denied_outcome(index, order, &ids[index], denial));
            }
        }
    }
    batch.trace.advance(PipelineState::SafetyEvaluated);

    // ------------------------------------------------------------------
    // Risk
    // ------------------------------------------------------------------
    let mut admitted: Vec<Admitted> = Vec::with_capacity(cleared.len());
    let risk = if cleared.is_empty() && !orders.is_empty() {
        None
    } else {
        let subset: Vec<OrderRequest> = cleared
            .iter()
            .map(|(index, _)| orders[*index].clone())
            .collect();
        let mut result = stages.risk.check(&subset, portfolio, stages.limits);
        remap_indices(&mut result, &cleared);
        Some(result)
    };

    if let Some(result) = &risk {
        batch.trace.advance(PipelineState::RiskChecked);
        summary.merge(&result.summary());

        for &(index, clearance) in &cleared {
            let order = &orders[index];
            let blocking = match result.order(index) {
                None => {
                    summary.record("risk_result");
                    Some(Denial {
                        stage: DenialStage::Risk,
                        code: RISK_RESULT_MISSING.to_string(),
                        reason: "risk check returned no verdict for order".to_string(),
                        retry_after_ms: None,
                    })
                }
                Some(verdict) => verdict.blocking_violation().map(|v| Denial {
                    stage: DenialStage::Risk,
                    code: v.code.as_str().to_string(),
                    reason: v.message.clone(),
                    retry_after_ms: v.retry_after_ms,
                }),
            };

            if let Some(denial) = blocking {
                Metrics::denied("risk", &denial.code);
                info!(
                    batch_id = %batch.id,
                    client_id = %ids[index],
                    code = %denial.code,
                    reason = %denial.reason,
                    "Order denied by risk admission"
                );
                slots[index] = Some(denied_outcome(index, order, &ids[index], denial));
                continue;
            }

            let mut warnings = Vec::new();
            if let Some(verdict) = result.order(index) {
                for violation in &verdict.violations {
                    Metrics::observed_violation(violation.code.as_str());
                    warn!(
                        batch_id = %batch.id,
                        client_id = %ids[index],
                        code = violation.code.as_str(),
                        metric = %violation.metric,
                        threshold = %violation.threshold,
                        "Risk violation observed, order proceeds"
                    );
                    warnings.push(violation.to_string());
                }
            }
            Metrics::admitted();
            admitted.push(Admitted {
                index,
                clearance,
                warnings,
            });
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------
    let terminal = if admitted.is_empty() && !orders.is_empty() {
        if risk.is_some() {
            TerminalState::DeniedRisk
        } else {
            TerminalState::DeniedSafety
        }
    } else {
        batch.trace.advance(PipelineState::Executing);
        let reached = admitted.len();
        let mut failed = 0usize;
        let mut partial = 0usize;

        for Admitted {
            index,
            clearance,
            warnings,
        } in admitted
        {
            let order = &orders[index];
            let route = stages.execution_route(clearance.route);
            let submitted = match stages.executor_for(route) {
                Some(executor) => executor.submit(order).await,
                None => Err(ExecutorError::Unsupported(format!(
                    "no executor configured for route {route}"
                ))),
            };

            let (fate, decision, retries) = match submitted {
                Ok(fill) => {
                    let decision = if fill.is_partial() {
                        partial += 1;
                        TerminalState::PartiallyExecuted
                    } else {
                        TerminalState::Executed
                    };
                    info!(
                        batch_id = %batch.id,
                        client_id = %ids[index],
                        route = %route,
                        price = %fill.price,
                        quantity = %fill.filled_quantity,
                        retries = fill.retries(),
                        simulated = fill.simulated,
                        "Order filled"
                    );
                    let retries = fill.retries();
                    (OrderFate::Filled(fill), decision, retries)
                }
                Err(e) => {
                    failed += 1;
                    let failure = e.to_failure();
                    warn!(
                        batch_id = %batch.id,
                        client_id = %ids[index],
                        route = %route,
                        code = %failure.code,
                        attempts = failure.attempts,
                        error = %e,
                        "Order execution failed"
                    );
                    let retries = failure.retries();
                    (OrderFate::Failed(failure), TerminalState::ExecutionFailed, retries)
                }
            };

            let outcome_label = match decision {
                TerminalState::Executed => "filled",
                TerminalState::PartiallyExecuted => "partial",
                _ => "failed",
            };
            Metrics::execution(route.as_str(), outcome_label, retries);

            let (code, reason) = match &fate {
                OrderFate::Failed(failure) => {
                    (Some(failure.code.clone()), Some(failure.message.clone()))
                }
                _ => (None, None),
            };
            let event = AuditEvent::execution(
                &batch.id,
                batch.mode,
                ids[index].clone(),
                route,
                order.summary(),
                decision,
            )
            .with_reason(code, reason)
            .with_retries(retries)
            .with_downgraded(clearance.downgraded);
            batch.record(&event);

            slots[index] = Some(OrderOutcome {
                order_index: index,
                client_id: ids[index].clone(),
                symbol: order.symbol.clone(),
                route: Some(route),
                downgraded: clearance.downgraded,
                fate,
                warnings,
            });
        }

        let denied = orders.len() - reached;
        if reached > 0 && failed == reached {
            TerminalState::ExecutionFailed
        } else if failed == 0 && partial == 0 && denied == 0 {
            TerminalState::Executed
        } else {
            TerminalState::PartiallyExecuted
        }
    };
    batch.trace.advance(terminal.into());

    let outcomes: Vec<OrderOutcome> = slots.into_iter().flatten().collect();
    let first_denial = outcomes.iter().find_map(OrderOutcome::denial);
    let first_failure = outcomes.iter().find_map(|o| match &o.fate {
        OrderFate::Failed(failure) => Some(failure),
        _ => None,
    });
    let (code, reason) = match (first_denial, first_failure) {
        (Some(denial), _) => (Some(denial.code.clone()), Some(denial.reason.clone())),
        (None, Some(failure)) => (Some(failure.code.clone()), Some(failure.message.clone())),
        (None, None) => (None, None),
    };
    let retries: u32 = outcomes
        .iter()
        .map(|o| match &o.fate {
            OrderFate::Filled(fill) => fill.retries(),
            OrderFate::Failed(failure) => failure.retries(),
            OrderFate::Denied(_) => 0,
        })
        .sum();
    let downgraded = outcomes.iter().any(|o| o.downgraded);
    let decisions: Vec<OrderDecision> = outcomes
        .iter()
        .filter_map(|o| {
            o.denial()
                .map(|denial| OrderDecision::denied(o.order_index, o.client_id.clone(), denial))
        })
        .collect();

    let event = AuditEvent::pipeline(&batch.id, batch.mode, input_summary(&orders), terminal)
        .with_reason(code, reason.clone())
        .with_retries(retries)
        .with_downgraded(downgraded)
        .with_violations(summary.clone())
        .with_decisions(decisions)
        .with_risk_metrics(risk.as_ref().map(|r| r.metrics.clone()));
    batch.record(&event);
    batch.trace.advance(PipelineState::Audited);
    batch.trace.advance(PipelineState::Done);

    let executed = outcomes.iter().filter(|o| o.reached_execution()).count();
    let elapsed_ms = clock.elapsed().as_secs_f64() * 1000.0;
    Metrics::pipeline_latency(elapsed_ms);
    info!(
        batch_id = %batch.id,
        mode = batch.mode,
        terminal = %terminal,
        orders = orders.len(),
        executed,
        denied = outcomes.len() - executed,
        elapsed_ms,
        "Batch complete"
    );

    ExecutionResult {
        batch_id: batch.id,
        mode: batch.mode.to_string(),
        rejected: !orders.is_empty() && executed == 0,
        reason,
        terminal,
        risk,
        outcomes,
        summary,
        trace: batch.trace.into_states(),
        audit_failures: batch.audit_failures,
        started_at,
        finished_at: Utc::now(),
    }
}

// ============================================================================
// ExecutionPipeline
// ============================================================================

/// Long-lived pipeline holding the stage implementations.
///
/// Built once by `PipelineBuilder`. Each call to `execute_with_safety`
/// reads one environment snapshot and one portfolio snapshot and treats both
/// as immutable for the whole batch.
pub struct ExecutionPipeline {
    pub(crate) environment: Arc<SharedEnvironment>,
    pub(crate) portfolio: DynPortfolioProvider,
    pub(crate) gate: Arc<dyn SafetyGate>,
    pub(crate) risk: Arc<dyn RiskAdmissionControl>,
    pub(crate) limits: RiskLimitsConfig,
    pub(crate) intent: Routing,
    pub(crate) preview: bool,
    pub(crate) executor: DynOrderExecutor,
    pub(crate) simulated: Arc<SimulatedExecutor>,
    pub(crate) audit: DynAuditSink,
    pub(crate) audit_failures: AtomicU64,
}

impl ExecutionPipeline {
    pub async fn execute_with_safety(&self, orders: &[OrderRequest]) -> ExecutionResult {
        let env = self.environment.snapshot();
        let portfolio = self.portfolio.snapshot();
        for (symbol, price) in &portfolio.mark_prices {
            self.simulated.prices().update(symbol, *price);
        }

        let stages = Stages {
            gate: self.gate.as_ref(),
            risk: self.risk.as_ref(),
            limits: &self.limits,
            intent: self.intent,
            preview: self.preview,
            executor: self.executor.as_ref(),
            simulated: self.simulated.as_ref(),
            audit: self.audit.as_ref(),
        };
        let result = execute_with_safety(orders, &env, &portfolio, &stages).await;

        self.audit_failures
            .fetch_add(result.audit_failures as u64, Ordering::Relaxed);
        for outcome in &result.outcomes {
            if !outcome.reached_execution() {
                continue;
            }
            if let Some(order) = orders.get(outcome.order_index) {
                self.portfolio.on_submitted(order.timestamp);
            }
            if let Some(fill) = outcome.fill() {
                self.portfolio.on_fill(fill);
            }
        }
        result
    }

    /// Route of the configured executor.
    #[must_use]
    pub fn route(&self) -> Routing {
        self.executor.route()
    }

    /// Route the safety gate is asked to clear.
    #[must_use]
    pub fn intent(&self) -> Routing {
        self.intent
    }

    #[must_use]
    pub fn is_preview(&self) -> bool {
        self.preview
    }

    pub fn environment(&self) -> &Arc<SharedEnvironment> {
        &self.environment
    }

    pub fn limits(&self) -> &RiskLimitsConfig {
        &self.limits
    }

    /// Audit events dropped by the sink since construction.
    #[must_use]
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Stop new placements from the next batch on. In-flight calls finish.
    pub fn engage_kill_switch(&self, reason: impl Into<String>) -> bool {
        let engaged = self.environment.engage_kill_switch(reason);
        Metrics::kill_switch(true);
        engaged
    }

    pub fn reset_kill_switch(&self) {
        self.environment.reset_kill_switch();
        Metrics::kill_switch(false);
    }

    /// Status from whichever executor saw the order.
    pub fn status(&self, id: &ClientOrderId) -> OrderStatus {
        match self.executor.status(id) {
            OrderStatus::Unknown => self.simulated.status(id),
            status => status,
        }
    }

    pub async fn cancel(&self, id: &ClientOrderId) -> ExecutorResult<()> {
        if self.executor.status(id) != OrderStatus::Unknown {
            self.executor.cancel(id).await
        } else {
            self.simulated.cancel(id).await
        }
    }
}
