//! One-time pipeline construction from validated configuration.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use ordergate_audit::DynAuditSink;
use ordergate_core::{EnvironmentState, PortfolioState, Routing};
use ordergate_executor::{DynOrderExecutor, SimulatedExecutor};
use ordergate_position::DynPortfolioProvider;
use ordergate_risk::{
    LimitsRiskControl, ModeSafetyGate, RiskAdmissionControl, RiskLimitsConfig, SafetyGate,
    SharedEnvironment,
};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::ExecutionPipeline;

/// Builder for [`ExecutionPipeline`].
///
/// Defaults: paper environment, empty portfolio, `ModeSafetyGate` without a
/// confirm token, `LimitsRiskControl`, unlimited risk config, simulated
/// executor. An audit sink is mandatory.
#[derive(Default)]
pub struct PipelineBuilder {
    environment: Option<Arc<SharedEnvironment>>,
    portfolio: Option<DynPortfolioProvider>,
    gate: Option<Arc<dyn SafetyGate>>,
    risk: Option<Arc<dyn RiskAdmissionControl>>,
    limits: RiskLimitsConfig,
    executor: Option<DynOrderExecutor>,
    intent: Option<Routing>,
    audit: Option<DynAuditSink>,
    preview: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn environment(mut self, env: EnvironmentState) -> Self {
        self.environment = Some(Arc::new(SharedEnvironment::new(env)));
        self
    }

    /// Share an environment handle so the operator can reload it or engage
    /// the kill switch from outside the pipeline.
    #[must_use]
    pub fn shared_environment(mut self, env: Arc<SharedEnvironment>) -> Self {
        self.environment = Some(env);
        self
    }

    #[must_use]
    pub fn portfolio(mut self, provider: DynPortfolioProvider) -> Self {
        self.portfolio = Some(provider);
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: Arc<dyn SafetyGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Use `ModeSafetyGate` with the expected live confirm token.
    #[must_use]
    pub fn confirm_token(mut self, token: impl Into<String>) -> Self {
        self.gate = Some(Arc::new(ModeSafetyGate::new(Some(token.into()))));
        self
    }

    #[must_use]
    pub fn risk(mut self, risk: Arc<dyn RiskAdmissionControl>) -> Self {
        self.risk = Some(risk);
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: RiskLimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: DynOrderExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Route the safety gate evaluates. Defaults to the executor's route.
    ///
    /// Lets a preview clear orders against a venue route whose executor was
    /// never constructed.
    #[must_use]
    pub fn intent(mut self, route: Routing) -> Self {
        self.intent = Some(route);
        self
    }

    #[must_use]
    pub fn audit(mut self, sink: DynAuditSink) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Force the simulated executor regardless of any executor set. The gate
    /// still evaluates the configured intent.
    #[must_use]
    pub fn preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn build(self) -> PipelineResult<ExecutionPipeline> {
        self.limits.validate()?;
        let audit = self
            .audit
            .ok_or_else(|| PipelineError::Config("audit sink is required".to_string()))?;

        let intent = self
            .intent
            .or_else(|| self.executor.as_ref().map(|e| e.route()))
            .unwrap_or(Routing::Simulated);

        let simulated = Arc::new(SimulatedExecutor::new());
        let fallback: DynOrderExecutor = simulated.clone();
        let executor = match self.executor {
            Some(executor) if !self.preview => executor,
            _ => fallback,
        };
        if self.preview {
            info!(intent = %intent, "Preview mode: executor forced to simulated");
        } else if intent != executor.route() {
            return Err(PipelineError::Config(format!(
                "intent {intent} has no executor (executor route is {})",
                executor.route()
            )));
        }

        let pipeline = ExecutionPipeline {
            environment: self
                .environment
                .unwrap_or_else(|| Arc::new(SharedEnvironment::new(EnvironmentState::paper()))),
            portfolio: self
                .portfolio
                .unwrap_or_else(|| Arc::new(PortfolioState::default())),
            gate: self
                .gate
                .unwrap_or_else(|| Arc::new(ModeSafetyGate::default())),
            risk: self
                .risk
                .unwrap_or_else(|| Arc::new(LimitsRiskControl::new())),
            limits: self.limits,
            intent,
            preview: self.preview,
            executor,
            simulated,
            audit,
            audit_failures: AtomicU64::new(0),
        };
        info!(
            route = %pipeline.route(),
            intent = %pipeline.intent(),
            mode = pipeline.environment.snapshot().mode_label(),
            "Execution pipeline built"
        );
        Ok(pipeline)
    }
}
