//! Live venue executor.
//!
//! The only executor that can move real capital. Reachable only when the
//! safety gate clears a Live order with `live_dry_run` off.
//!
//! Error handling:
//! - network, timeout: retried with bounded exponential backoff
//! - rate limited: retried after the venue's hint or the backoff, whichever
//!   is longer
//! - authentication: fatal; the executor disables itself for the session
//! - rejection: terminal for that order only
//! - ack with no price and no venue reference price: terminal, the order is
//!   left for reconciliation instead of being booked at zero
//!
//! Every retry reuses the order's client id so the venue can deduplicate.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use ordergate_core::{ClientOrderId, Fill, OrderRequest, OrderStatus, Price, Routing};
use tracing::{error, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{client_id_for, BoxFuture, OrderExecutor, OrderTracker};
use crate::retry::{with_retry, RetryPolicy};
use crate::venue::{DynVenueClient, VenueOrder};

pub struct LiveVenueExecutor {
    venue: DynVenueClient,
    policy: RetryPolicy,
    orders: OrderTracker,
    disabled: AtomicBool,
}

impl LiveVenueExecutor {
    #[must_use]
    pub fn new(venue: DynVenueClient, policy: RetryPolicy) -> Self {
        Self {
            venue,
            policy,
            orders: OrderTracker::new(),
            disabled: AtomicBool::new(false),
        }
    }

    /// True after an authentication failure.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn ensure_enabled(&self) -> ExecutorResult<()> {
        if self.is_disabled() {
            return Err(ExecutorError::Disabled(
                "authentication failed earlier in this session".to_string(),
            ));
        }
        Ok(())
    }

    fn note_failure(&self, error: &ExecutorError) {
        if matches!(error.root(), ExecutorError::Auth(_))
            && self
                .disabled
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            error!(
                venue = self.venue.name(),
                error = %error,
                "Venue authentication failed, live executor disabled for session"
            );
        }
    }

    async fn place(&self, order: &OrderRequest) -> ExecutorResult<Fill> {
        self.ensure_enabled()?;

        let client_id = client_id_for(order);
        let venue_order = VenueOrder::from_request(order, client_id.clone());
        self.orders.set(&client_id, OrderStatus::Pending);

        let placed = with_retry(&self.policy, "place_order", || {
            self.venue.place_order(&venue_order)
        })
        .await;

        let (ack, attempts) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                self.note_failure(&e);
                let status = match e.root() {
                    ExecutorError::Rejected(_) => OrderStatus::Rejected,
                    _ => OrderStatus::Failed,
                };
                self.orders.set(&client_id, status);
                warn!(
                    client_id = %client_id,
                    symbol = %order.symbol,
                    code = e.code(),
                    attempts = e.attempts(),
                    error = %e,
                    "Live order failed"
                );
                return Err(e);
            }
        };

        if ack.status == OrderStatus::Rejected {
            self.orders.set(&client_id, OrderStatus::Rejected);
            return Err(ExecutorError::Rejected(format!(
                "venue rejected order {}",
                ack.venue_order_id
            ))
            .after_attempts(attempts));
        }

        self.orders.set(&client_id, ack.status);
        let Some(price) = self.fill_price(order, ack.avg_price).await else {
            error!(
                client_id = %client_id,
                venue_order_id = %ack.venue_order_id,
                symbol = %order.symbol,
                status = ?ack.status,
                filled_quantity = %ack.filled_quantity,
                "Venue ack carried no price and no reference price is known"
            );
            return Err(ExecutorError::Unreconciled(format!(
                "venue order {} acknowledged without a fill price",
                ack.venue_order_id
            ))
            .after_attempts(attempts));
        };

        info!(
            client_id = %client_id,
            venue_order_id = %ack.venue_order_id,
            symbol = %order.symbol,
            status = ?ack.status,
            filled_quantity = %ack.filled_quantity,
            price = %price,
            attempts,
            "Live order acknowledged"
        );

        Ok(Fill {
            client_id,
            symbol: order.symbol.clone(),
            side: order.side,
            requested_quantity: order.quantity,
            filled_quantity: ack.filled_quantity,
            price,
            route: Routing::LiveVenue,
            simulated: false,
            venue_order_id: Some(ack.venue_order_id),
            attempts,
            filled_at: Utc::now(),
        })
    }

    /// Fill price: venue average, then the order's limit, then the venue's
    /// reference price for the symbol. Non-positive values never qualify.
    async fn fill_price(&self, order: &OrderRequest, avg_price: Option<Price>) -> Option<Price> {
        if let Some(price) = avg_price.or(order.price).filter(|p| p.is_positive()) {
            return Some(price);
        }
        match self.venue.symbol_rules(&order.symbol).await {
            Ok(rules) => rules.reference_price.filter(|p| p.is_positive()),
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "Reference price lookup failed");
                None
            }
        }
    }

    async fn cancel_remote(&self, id: &ClientOrderId) -> ExecutorResult<()> {
        self.ensure_enabled()?;
        if self.orders.get(id) == OrderStatus::Unknown {
            return Err(ExecutorError::UnknownOrder(id.to_string()));
        }
        match with_retry(&self.policy, "cancel_order", || self.venue.cancel_order(id)).await {
            Ok(((), _)) => {
                self.orders.set(id, OrderStatus::Cancelled);
                Ok(())
            }
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            }
        }
    }
}

impl OrderExecutor for LiveVenueExecutor {
    fn route(&self) -> Routing {
        Routing::LiveVenue
    }

    fn submit<'a>(&'a self, order: &'a OrderRequest) -> BoxFuture<'a, ExecutorResult<Fill>> {
        Box::pin(self.place(order))
    }

    fn cancel<'a>(&'a self, id: &'a ClientOrderId) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(self.cancel_remote(id))
    }

    fn status(&self, id: &ClientOrderId) -> OrderStatus {
        self.orders.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{ScriptedReply, ScriptedVenue, SymbolRules, VenueAck};
    use ordergate_core::{OrderSide, Size};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            jitter_factor: 0.0,
            call_timeout_ms: 50,
            ..RetryPolicy::default()
        }
    }

    fn order(id: &str) -> OrderRequest {
        OrderRequest::limit(
            "BTC-USD",
            OrderSide::Buy,
            Size::new(dec!(1)),
            Price::new(dec!(100)),
        )
        .with_client_id(ClientOrderId::from(id))
    }

    #[tokio::test]
    async fn test_two_timeouts_then_fill() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_replies([
            ScriptedReply::Hang(Duration::from_millis(500)),
            ScriptedReply::Hang(Duration::from_millis(500)),
            ScriptedReply::Fill,
        ]);
        let executor = LiveVenueExecutor::new(venue.clone(), policy());

        let fill = executor.submit(&order("l1")).await.unwrap();
        assert_eq!(fill.attempts, 3);
        assert_eq!(fill.retries(), 2);
        assert!(!fill.simulated);
        assert_eq!(fill.route, Routing::LiveVenue);
        assert!(venue.placed().iter().all(|o| o.client_id.as_str() == "l1"));
        assert_eq!(executor.status(&ClientOrderId::from("l1")), OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_replies([
            ScriptedReply::Fail(ExecutorError::Network("a".into())),
            ScriptedReply::Fail(ExecutorError::Network("b".into())),
            ScriptedReply::Fail(ExecutorError::Network("c".into())),
        ]);
        let executor = LiveVenueExecutor::new(venue.clone(), policy());

        let err = executor.submit(&order("l2")).await.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(venue.place_calls(), 3);
        assert_eq!(executor.status(&ClientOrderId::from("l2")), OrderStatus::Failed);
        assert!(!executor.is_disabled());
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_and_order_scoped() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_reply(ScriptedReply::Fail(ExecutorError::Rejected("size".into())));
        let executor = LiveVenueExecutor::new(venue.clone(), policy());

        assert!(executor.submit(&order("l3")).await.is_err());
        assert_eq!(venue.place_calls(), 1);
        assert!(executor.submit(&order("l4")).await.is_ok());
    }

    #[tokio::test]
    async fn test_auth_failure_disables_session() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_reply(ScriptedReply::Fail(ExecutorError::Auth("bad key".into())));
        let executor = LiveVenueExecutor::new(venue.clone(), policy());

        let err = executor.submit(&order("l5")).await.unwrap_err();
        assert_eq!(err.code(), "EXEC_AUTH");
        assert!(executor.is_disabled());

        let err = executor.submit(&order("l6")).await.unwrap_err();
        assert_eq!(err.code(), "EXEC_DISABLED");
        assert_eq!(venue.place_calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_then_fill() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_replies([
            ScriptedReply::Fail(ExecutorError::RateLimited {
                retry_after_ms: Some(5),
            }),
            ScriptedReply::Fill,
        ]);
        let executor = LiveVenueExecutor::new(venue.clone(), policy());
        let fill = executor.submit(&order("l7")).await.unwrap();
        assert_eq!(fill.attempts, 2);
    }

    #[tokio::test]
    async fn test_venue_rejected_ack() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_reply(ScriptedReply::Ack(VenueAck {
            venue_order_id: "v9".to_string(),
            status: OrderStatus::Rejected,
            filled_quantity: Size::ZERO,
            avg_price: None,
        }));
        let executor = LiveVenueExecutor::new(venue, policy());
        let err = executor.submit(&order("l8")).await.unwrap_err();
        assert_eq!(err.code(), "EXEC_REJECTED");
    }

    fn market_ack() -> ScriptedReply {
        ScriptedReply::Ack(VenueAck {
            venue_order_id: "v2".to_string(),
            status: OrderStatus::Filled,
            filled_quantity: Size::new(dec!(1)),
            avg_price: None,
        })
    }

    fn market(id: &str) -> OrderRequest {
        OrderRequest::market("BTC-USD", OrderSide::Buy, Size::new(dec!(1)))
            .with_client_id(ClientOrderId::from(id))
    }

    #[tokio::test]
    async fn test_unpriced_market_fill_uses_reference_price() {
        let venue = Arc::new(ScriptedVenue::new().with_rules(SymbolRules {
            reference_price: Some(Price::new(dec!(250))),
            ..SymbolRules::permissive("BTC-USD")
        }));
        venue.push_reply(market_ack());
        let executor = LiveVenueExecutor::new(venue.clone(), policy());

        let fill = executor.submit(&market("m1")).await.unwrap();
        assert_eq!(fill.price, Price::new(dec!(250)));
        assert_eq!(venue.rules_calls(), 1);
    }

    #[tokio::test]
    async fn test_unpriced_market_fill_needs_reconciliation() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_reply(market_ack());
        let executor = LiveVenueExecutor::new(venue.clone(), policy());

        let err = executor.submit(&market("m2")).await.unwrap_err();
        assert_eq!(err.code(), "EXEC_NEEDS_RECONCILIATION");
        assert!(!err.to_failure().retryable);
        assert_eq!(venue.place_calls(), 1);
        // The venue holds the order, so the tracked status follows the ack.
        assert_eq!(executor.status(&ClientOrderId::from("m2")), OrderStatus::Filled);
        assert!(!executor.is_disabled());
    }

    #[tokio::test]
    async fn test_cancel_calls_venue() {
        let venue = Arc::new(ScriptedVenue::new());
        venue.push_reply(ScriptedReply::Ack(VenueAck {
            venue_order_id: "v1".to_string(),
            status: OrderStatus::Pending,
            filled_quantity: Size::ZERO,
            avg_price: None,
        }));
        let executor = LiveVenueExecutor::new(venue.clone(), policy());
        let fill = executor.submit(&order("l9")).await.unwrap();
        assert!(fill.is_partial());

        executor.cancel(&ClientOrderId::from("l9")).await.unwrap();
        assert_eq!(venue.cancelled(), vec![ClientOrderId::from("l9")]);
        assert_eq!(executor.status(&ClientOrderId::from("l9")), OrderStatus::Cancelled);

        assert!(matches!(
            executor.cancel(&ClientOrderId::from("never")).await,
            Err(ExecutorError::UnknownOrder(_))
        ));
    }
}
