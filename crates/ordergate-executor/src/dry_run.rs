//! Dry-run venue executor.
//!
//! Makes read-only calls to a real venue to validate an order against the
//! symbol's trading rules, then returns a synthetic fill tagged
//! `simulated = true`. Never calls `place_order`.

use ordergate_core::{ClientOrderId, Fill, OrderRequest, OrderStatus, Routing};
use tracing::{debug, info};

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{client_id_for, BoxFuture, OrderExecutor, OrderTracker};
use crate::retry::{with_retry, RetryPolicy};
use crate::venue::DynVenueClient;

pub struct DryRunVenueExecutor {
    venue: DynVenueClient,
    policy: RetryPolicy,
    orders: OrderTracker,
}

impl DryRunVenueExecutor {
    #[must_use]
    pub fn new(venue: DynVenueClient, policy: RetryPolicy) -> Self {
        Self {
            venue,
            policy,
            orders: OrderTracker::new(),
        }
    }

    async fn validate_and_fill(&self, order: &OrderRequest) -> ExecutorResult<Fill> {
        let client_id = client_id_for(order);
        self.orders.set(&client_id, OrderStatus::Pending);

        let result = self.run(order, client_id.clone()).await;
        let status = match &result {
            Ok(_) => OrderStatus::Filled,
            Err(e) if matches!(e.root(), ExecutorError::Rejected(_)) => OrderStatus::Rejected,
            Err(_) => OrderStatus::Failed,
        };
        self.orders.set(&client_id, status);
        result
    }

    async fn run(&self, order: &OrderRequest, client_id: ClientOrderId) -> ExecutorResult<Fill> {
        let (rules, attempts) = with_retry(&self.policy, "symbol_rules", || {
            self.venue.symbol_rules(&order.symbol)
        })
        .await?;

        let price = order
            .price
            .or(rules.reference_price)
            .filter(|p| p.is_positive())
            .ok_or_else(|| {
                ExecutorError::Rejected(format!("no reference price for {}", order.symbol))
            })?;

        if let Err(reason) = rules.check(order, price) {
            debug!(
                client_id = %client_id,
                symbol = %order.symbol,
                reason = %reason,
                "Dry-run validation rejected order"
            );
            return Err(ExecutorError::Rejected(reason).after_attempts(attempts));
        }

        info!(
            client_id = %client_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            price = %price,
            venue = self.venue.name(),
            "Dry-run order validated, synthetic fill"
        );

        Ok(Fill {
            client_id,
            symbol: order.symbol.clone(),
            side: order.side,
            requested_quantity: order.quantity,
            filled_quantity: order.quantity,
            price,
            route: Routing::DryRunVenue,
            simulated: true,
            venue_order_id: None,
            attempts,
            filled_at: order.timestamp,
        })
    }
}

impl OrderExecutor for DryRunVenueExecutor {
    fn route(&self) -> Routing {
        Routing::DryRunVenue
    }

    fn submit<'a>(&'a self, order: &'a OrderRequest) -> BoxFuture<'a, ExecutorResult<Fill>> {
        Box::pin(self.validate_and_fill(order))
    }

    fn cancel<'a>(&'a self, id: &'a ClientOrderId) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(async move { self.orders.cancel_local(id) })
    }

    fn status(&self, id: &ClientOrderId) -> OrderStatus {
        self.orders.get(id)
    }
}
