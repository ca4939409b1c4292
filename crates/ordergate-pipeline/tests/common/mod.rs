//! Shared test doubles for pipeline scenarios.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ordergate_audit::{AuditError, AuditEvent, AuditResult, AuditSink, MemoryAuditSink};
use ordergate_core::{
    ClientOrderId, Fill, OrderRequest, OrderSide, OrderStatus, PortfolioState, Price, Routing,
    Size,
};
use ordergate_executor::{BoxFuture, ExecutorResult, OrderExecutor, SimulatedExecutor};
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// Executor that counts submissions and fills immediately at the order price.
pub struct CountingExecutor {
    route: Routing,
    inner: SimulatedExecutor,
    calls: AtomicUsize,
    seen: Mutex<Vec<ClientOrderId>>,
}

impl CountingExecutor {
    pub fn new(route: Routing) -> Arc<Self> {
        Arc::new(Self {
            route,
            inner: SimulatedExecutor::new(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ClientOrderId> {
        self.seen.lock().clone()
    }
}

impl OrderExecutor for CountingExecutor {
    fn route(&self) -> Routing {
        self.route
    }

    fn submit<'a>(&'a self, order: &'a OrderRequest) -> BoxFuture<'a, ExecutorResult<Fill>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = &order.client_id {
                self.seen.lock().push(id.clone());
            }
            let mut fill = self.inner.submit(order).await?;
            fill.route = self.route;
            fill.simulated = self.route != Routing::LiveVenue;
            Ok(fill)
        })
    }

    fn cancel<'a>(&'a self, id: &'a ClientOrderId) -> BoxFuture<'a, ExecutorResult<()>> {
        self.inner.cancel(id)
    }

    fn status(&self, id: &ClientOrderId) -> OrderStatus {
        self.inner.status(id)
    }
}

/// Sink that fails every write.
pub struct FailingSink;

impl AuditSink for FailingSink {
    fn record(&self, _event: &AuditEvent) -> AuditResult<()> {
        Err(AuditError::Unavailable("disk full".to_string()))
    }
}

pub fn memory_sink() -> Arc<MemoryAuditSink> {
    Arc::new(MemoryAuditSink::new())
}

pub fn limit(symbol: &str, side: OrderSide, qty: Decimal, price: Decimal) -> OrderRequest {
    OrderRequest::limit(symbol, side, Size::new(qty), Price::new(price))
}

pub fn portfolio_with_equity(equity: Decimal) -> PortfolioState {
    PortfolioState {
        equity,
        cash: equity,
        ..Default::default()
    }
}
