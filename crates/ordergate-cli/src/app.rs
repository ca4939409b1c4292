//! Application wiring.
//!
//! Turns a validated `AppConfig` into an `ExecutionPipeline`:
//! - Executor backend per `executor.route` (HTTP venue client for venue routes)
//! - Audit fan-out: in-memory log, optional daily JSON Lines files, optional
//!   broadcast stream for tailing
//! - Preview runs that force the simulated executor while the safety gate
//!   still evaluates the configured route

use std::path::Path;
use std::sync::Arc;

use ordergate_audit::{
    AuditEvent, BroadcastAuditSink, DynAuditSink, FanoutAuditSink, JsonLinesAuditSink,
    MemoryAuditSink,
};
use ordergate_core::{ExecutionResult, OrderRequest, PortfolioState, Routing};
use ordergate_executor::{
    DryRunVenueExecutor, DynOrderExecutor, DynVenueClient, HttpVenueClient, LiveVenueExecutor,
};
use ordergate_pipeline::{ExecutionPipeline, PipelineBuilder};
use ordergate_position::DynPortfolioProvider;
use ordergate_risk::ModeSafetyGate;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Main application.
pub struct Application {
    config: AppConfig,
    audit: DynAuditSink,
    audit_log: Arc<MemoryAuditSink>,
    audit_stream: Option<Arc<BroadcastAuditSink>>,
}

impl Application {
    /// Validate the config and open the audit destinations.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let audit_log = Arc::new(MemoryAuditSink::new());
        let mut fanout = FanoutAuditSink::new(vec![audit_log.clone()]);

        if let Some(dir) = &config.audit.dir {
            fanout.push(Arc::new(JsonLinesAuditSink::new(dir)?));
            info!(dir = %dir.display(), "Audit files enabled");
        }

        let audit_stream = (config.audit.broadcast_capacity > 0)
            .then(|| Arc::new(BroadcastAuditSink::new(config.audit.broadcast_capacity)));
        if let Some(stream) = &audit_stream {
            fanout.push(stream.clone());
        }

        Ok(Self {
            config,
            audit: Arc::new(fanout),
            audit_log,
            audit_stream,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Every audit event recorded by pipelines built from this application.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit_log.events()
    }

    /// Tail the audit stream. `None` when the broadcast sink is disabled.
    pub fn subscribe_audit(&self) -> Option<broadcast::Receiver<AuditEvent>> {
        self.audit_stream.as_ref().map(|stream| stream.subscribe())
    }

    /// Build a pipeline against the given portfolio provider.
    ///
    /// With `preview` set the configured venue executor is never constructed,
    /// but orders are still cleared against `executor.route`.
    pub fn build_pipeline(
        &self,
        preview: bool,
        portfolio: DynPortfolioProvider,
    ) -> AppResult<ExecutionPipeline> {
        let mut builder = PipelineBuilder::new()
            .environment(self.config.environment.clone())
            .portfolio(portfolio)
            .gate(Arc::new(ModeSafetyGate::new(
                self.config.safety.expected_confirm_token.clone(),
            )))
            .limits(self.config.risk.clone())
            .intent(self.config.executor.route)
            .audit(self.audit.clone())
            .preview(preview);

        if !preview {
            if let Some(executor) = self.venue_executor()? {
                builder = builder.executor(executor);
            }
        }
        Ok(builder.build()?)
    }

    /// Run one batch with the simulated executor, whatever the config routes to.
    pub async fn preview(
        &self,
        orders: &[OrderRequest],
        portfolio: PortfolioState,
    ) -> AppResult<ExecutionResult> {
        let pipeline = self.build_pipeline(true, Arc::new(portfolio))?;
        Ok(pipeline.execute_with_safety(orders).await)
    }

    /// Run one batch on the configured route.
    pub async fn execute(
        &self,
        orders: &[OrderRequest],
        portfolio: PortfolioState,
    ) -> AppResult<ExecutionResult> {
        let pipeline = self.build_pipeline(false, Arc::new(portfolio))?;
        Ok(pipeline.execute_with_safety(orders).await)
    }

    fn venue_executor(&self) -> AppResult<Option<DynOrderExecutor>> {
        let executor = &self.config.executor;
        if executor.route == Routing::Simulated {
            return Ok(None);
        }
        let url = executor.venue_url.clone().ok_or_else(|| {
            AppError::Config(format!("executor.venue_url is required for route {}", executor.route))
        })?;
        let client: DynVenueClient = Arc::new(HttpVenueClient::new(
            url,
            executor.api_key.clone(),
            executor.request_timeout(),
        )?);

        let built: DynOrderExecutor = match executor.route {
            Routing::DryRunVenue => {
                Arc::new(DryRunVenueExecutor::new(client, executor.retry.clone()))
            }
            Routing::LiveVenue => Arc::new(LiveVenueExecutor::new(client, executor.retry.clone())),
            Routing::Simulated => return Ok(None),
        };
        Ok(Some(built))
    }
}

/// Read a JSON array of orders.
pub fn load_orders(path: impl AsRef<Path>) -> AppResult<Vec<OrderRequest>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Input(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Input(format!("invalid orders in {}: {e}", path.display())))
}

/// Read a portfolio snapshot, or start from an empty one.
pub fn load_portfolio_or_default(path: Option<&Path>) -> AppResult<PortfolioState> {
    match path {
        Some(path) => ordergate_position::load_portfolio(path)
            .map_err(|e| AppError::Input(format!("invalid portfolio in {}: {e}", path.display()))),
        None => Ok(PortfolioState::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordergate_core::{EnvironmentState, OrderSide, Price, Size, TerminalState};
    use ordergate_risk::RiskLimitsConfig;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn capped_config() -> AppConfig {
        AppConfig {
            risk: RiskLimitsConfig {
                max_order_notional: Some(dec!(1000)),
                ..RiskLimitsConfig::default()
            },
            ..AppConfig::default()
        }
    }

    fn order(quantity: rust_decimal::Decimal) -> OrderRequest {
        OrderRequest::limit(
            "BTC-USD",
            OrderSide::Buy,
            Size::new(quantity),
            Price::new(dec!(100)),
        )
    }

    fn portfolio() -> PortfolioState {
        PortfolioState {
            equity: dec!(100000),
            peak_equity: dec!(100000),
            ..PortfolioState::default()
        }
    }

    #[tokio::test]
    async fn test_preview_reports_denials() {
        let app = Application::new(capped_config()).unwrap();
        let result = app
            .preview(&[order(dec!(1)), order(dec!(20))], portfolio())
            .await
            .unwrap();

        assert_eq!(result.executed_count(), 1);
        assert_eq!(result.denied_count(), 1);
        assert_eq!(result.terminal, TerminalState::PartiallyExecuted);
        assert_eq!(result.outcomes[0].route, Some(Routing::Simulated));
        assert!(!app.audit_events().is_empty());
    }

    fn venue_config(environment: EnvironmentState, route: Routing) -> AppConfig {
        let mut config = AppConfig {
            environment,
            ..AppConfig::default()
        };
        config.executor.route = route;
        config.executor.venue_url = Some("http://127.0.0.1:9".to_string());
        config
    }

    #[tokio::test]
    async fn test_preview_matches_real_safety_verdict() {
        let cases = [
            (EnvironmentState::paper(), Routing::LiveVenue, Some("SAFETY_PAPER_NON_SIMULATED")),
            (EnvironmentState::paper(), Routing::DryRunVenue, Some("SAFETY_PAPER_NON_SIMULATED")),
            (EnvironmentState::testnet(), Routing::LiveVenue, Some("SAFETY_TESTNET_LIVE_ROUTING")),
            (EnvironmentState::paper(), Routing::Simulated, None),
        ];
        for (environment, route, code) in cases {
            let app = Application::new(venue_config(environment, route)).unwrap();
            let preview = app.preview(&[order(dec!(1))], portfolio()).await.unwrap();
            let real = app.execute(&[order(dec!(1))], portfolio()).await.unwrap();

            assert_eq!(preview.has_denials(), real.has_denials(), "route {route}");
            let code_of = |r: &ExecutionResult| {
                r.outcomes[0].denial().map(|d| d.code.clone())
            };
            assert_eq!(code_of(&preview), code.map(str::to_string), "route {route}");
            assert_eq!(code_of(&preview), code_of(&real), "route {route}");
        }
    }

    #[tokio::test]
    async fn test_preview_never_uses_venue() {
        let mut config = AppConfig {
            environment: EnvironmentState::testnet(),
            ..AppConfig::default()
        };
        config.executor.route = Routing::DryRunVenue;
        config.executor.venue_url = Some("http://127.0.0.1:9".to_string());
        let app = Application::new(config).unwrap();

        let pipeline = app
            .build_pipeline(true, Arc::new(PortfolioState::default()))
            .unwrap();
        assert_eq!(pipeline.route(), Routing::Simulated);
        assert_eq!(pipeline.intent(), Routing::DryRunVenue);

        let result = app.preview(&[order(dec!(1))], portfolio()).await.unwrap();
        assert!(!result.has_denials());
        assert_eq!(result.outcomes[0].route, Some(Routing::Simulated));
    }

    #[test]
    fn test_configured_route_without_preview() {
        let mut config = AppConfig::default();
        config.executor.route = Routing::DryRunVenue;
        config.executor.venue_url = Some("http://127.0.0.1:9".to_string());
        let app = Application::new(config).unwrap();

        let pipeline = app
            .build_pipeline(false, Arc::new(PortfolioState::default()))
            .unwrap();
        assert_eq!(pipeline.route(), Routing::DryRunVenue);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.executor.retry.max_attempts = 0;
        assert!(matches!(Application::new(config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_audit_files_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = capped_config();
        config.audit.dir = Some(dir.path().to_path_buf());
        let app = Application::new(config).unwrap();

        app.preview(&[order(dec!(1))], portfolio()).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_audit_stream_subscription() {
        let app = Application::new(AppConfig::default()).unwrap();
        let mut rx = app.subscribe_audit().unwrap();

        app.preview(&[order(dec!(1))], portfolio()).await.unwrap();

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_load_orders() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"symbol":"ETH-USD","side":"sell","quantity":"2","order_type":"market"}}]"#
        )
        .unwrap();
        let orders = load_orders(file.path()).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Sell);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        assert!(matches!(load_orders(bad.path()), Err(AppError::Input(_))));
        assert!(matches!(
            load_orders("/nonexistent/orders.json"),
            Err(AppError::Input(_))
        ));
    }

    #[test]
    fn test_portfolio_defaults_to_empty() {
        let state = load_portfolio_or_default(None).unwrap();
        assert!(state.positions.is_empty());
        assert!(load_portfolio_or_default(Some(Path::new("/nonexistent.json"))).is_err());
    }
}
