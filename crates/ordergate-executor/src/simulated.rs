//! Simulated executor.
//!
//! Fills immediately and deterministically, with no network access. The fill
//! price is the order's own price, else the latest supplied mark price. Used
//! for paper trading, historical replay and live dry-run downgrades.

use std::sync::Arc;

use dashmap::DashMap;
use ordergate_core::{ClientOrderId, Fill, OrderRequest, OrderStatus, Price, Routing};
use tracing::debug;

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{client_id_for, BoxFuture, OrderExecutor, OrderTracker};

/// Thread-safe symbol to mark price cache feeding simulated fills.
#[derive(Debug, Default)]
pub struct MarkPriceCache {
    prices: DashMap<String, Price>,
}

impl MarkPriceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, symbol: &str, price: Price) {
        self.prices.insert(symbol.to_string(), price);
    }

    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Price> {
        self.prices.get(symbol).map(|p| *p)
    }

    pub fn remove(&self, symbol: &str) {
        self.prices.remove(symbol);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Deterministic fill backend.
#[derive(Debug, Default)]
pub struct SimulatedExecutor {
    prices: Arc<MarkPriceCache>,
    orders: OrderTracker,
}

impl SimulatedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prices(prices: Arc<MarkPriceCache>) -> Self {
        Self {
            prices,
            orders: OrderTracker::new(),
        }
    }

    #[must_use]
    pub fn prices(&self) -> &Arc<MarkPriceCache> {
        &self.prices
    }

    fn fill(&self, order: &OrderRequest) -> ExecutorResult<Fill> {
        let client_id = client_id_for(order);
        let price = match order.price.or_else(|| self.prices.get(&order.symbol)) {
            Some(price) if price.is_positive() => price,
            _ => {
                self.orders.set(&client_id, OrderStatus::Rejected);
                return Err(ExecutorError::Rejected(format!(
                    "no simulated price for {}",
                    order.symbol
                )));
            }
        };

        self.orders.set(&client_id, OrderStatus::Filled);
        debug!(
            client_id = %client_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            price = %price,
            "Simulated fill"
        );

        Ok(Fill {
            client_id,
            symbol: order.symbol.clone(),
            side: order.side,
            requested_quantity: order.quantity,
            filled_quantity: order.quantity,
            price,
            route: Routing::Simulated,
            simulated: true,
            venue_order_id: None,
            attempts: 1,
            filled_at: order.timestamp,
        })
    }
}

impl OrderExecutor for SimulatedExecutor {
    fn route(&self) -> Routing {
        Routing::Simulated
    }

    fn submit<'a>(&'a self, order: &'a OrderRequest) -> BoxFuture<'a, ExecutorResult<Fill>> {
        Box::pin(async move { self.fill(order) })
    }

    fn cancel<'a>(&'a self, id: &'a ClientOrderId) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(async move { self.orders.cancel_local(id) })
    }

    fn status(&self, id: &ClientOrderId) -> OrderStatus {
        self.orders.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordergate_core::{OrderSide, Size};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fills_at_order_price() {
        let executor = SimulatedExecutor::new();
        let order = OrderRequest::limit(
            "BTC-USD",
            OrderSide::Buy,
            Size::new(dec!(1)),
            Price::new(dec!(100)),
        )
        .with_client_id(ClientOrderId::from("c1"));

        let fill = executor.submit(&order).await.unwrap();
        assert_eq!(fill.price, Price::new(dec!(100)));
        assert_eq!(fill.filled_quantity, fill.requested_quantity);
        assert!(fill.simulated);
        assert_eq!(fill.attempts, 1);
        assert_eq!(fill.filled_at, order.timestamp);
        assert_eq!(executor.status(&ClientOrderId::from("c1")), OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_market_order_uses_cached_price() {
        let executor = SimulatedExecutor::new();
        executor.prices().update("ETH-USD", Price::new(dec!(42)));
        let order = OrderRequest::market("ETH-USD", OrderSide::Sell, Size::new(dec!(2)));
        let fill = executor.submit(&order).await.unwrap();
        assert_eq!(fill.price, Price::new(dec!(42)));
    }

    #[tokio::test]
    async fn test_no_price_is_rejected() {
        let executor = SimulatedExecutor::new();
        let order = OrderRequest::market("ETH-USD", OrderSide::Sell, Size::new(dec!(2)))
            .with_client_id(ClientOrderId::from("c2"));
        let err = executor.submit(&order).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected(_)));
        assert_eq!(executor.status(&ClientOrderId::from("c2")), OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let executor = SimulatedExecutor::new();
        let order = OrderRequest::limit(
            "BTC-USD",
            OrderSide::Buy,
            Size::new(dec!(3)),
            Price::new(dec!(7)),
        )
        .with_client_id(ClientOrderId::from("same"));
        let a = executor.submit(&order).await.unwrap();
        let b = executor.submit(&order).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_cancel_filled_order_fails() {
        let executor = SimulatedExecutor::new();
        let order = OrderRequest::limit(
            "BTC-USD",
            OrderSide::Buy,
            Size::new(dec!(1)),
            Price::new(dec!(1)),
        )
        .with_client_id(ClientOrderId::from("c3"));
        executor.submit(&order).await.unwrap();
        assert!(executor.cancel(&ClientOrderId::from("c3")).await.is_err());
        assert!(matches!(
            executor.cancel(&ClientOrderId::from("nope")).await,
            Err(ExecutorError::UnknownOrder(_))
        ));
    }
}
