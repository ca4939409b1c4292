//! Venue client abstraction.
//!
//! `VenueClient` separates executor policy (retries, validation, session
//! state) from transport. `HttpVenueClient` talks REST; `ScriptedVenue` is a
//! scripted in-process double for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ordergate_core::{
    ClientOrderId, OrderRequest, OrderSide, OrderStatus, OrderType, Price, Size,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::BoxFuture;

// ============================================================================
// Wire Types
// ============================================================================

/// Trading rules a venue publishes for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRules {
    pub symbol: String,
    #[serde(default = "default_tradable")]
    pub tradable: bool,
    #[serde(default)]
    pub min_quantity: Size,
    /// Lot step; zero means any quantity.
    #[serde(default)]
    pub quantity_step: Size,
    /// Price tick; zero means any price.
    #[serde(default)]
    pub tick_size: Price,
    #[serde(default)]
    pub min_notional: Decimal,
    /// Last traded or mark price, used to value market orders.
    #[serde(default)]
    pub reference_price: Option<Price>,
}

fn default_tradable() -> bool {
    true
}

impl SymbolRules {
    /// Rules that accept any order on `symbol`.
    pub fn permissive(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tradable: true,
            min_quantity: Size::ZERO,
            quantity_step: Size::ZERO,
            tick_size: Price::ZERO,
            min_notional: Decimal::ZERO,
            reference_price: None,
        }
    }

    /// Check an order against these rules. `price` is the price the order
    /// would be valued at.
    pub fn check(&self, order: &OrderRequest, price: Price) -> Result<(), String> {
        if !self.tradable {
            return Err(format!("{} is not tradable", self.symbol));
        }
        if order.quantity < self.min_quantity {
            return Err(format!(
                "quantity {} below minimum {}",
                order.quantity, self.min_quantity
            ));
        }
        if !order.quantity.is_on_step(self.quantity_step) {
            return Err(format!(
                "quantity {} is not a multiple of step {}",
                order.quantity, self.quantity_step
            ));
        }
        if let Some(limit) = order.price {
            if !limit.is_on_tick(self.tick_size) {
                return Err(format!("price {limit} is not on tick {}", self.tick_size));
            }
        }
        let notional = order.quantity.notional(price);
        if notional < self.min_notional {
            return Err(format!(
                "notional {notional} below minimum {}",
                self.min_notional
            ));
        }
        Ok(())
    }
}

/// Order as sent to a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrder {
    pub client_id: ClientOrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Size,
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}

impl VenueOrder {
    pub fn from_request(order: &OrderRequest, client_id: ClientOrderId) -> Self {
        Self {
            client_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            order_type: order.order_type,
            price: order.price,
        }
    }
}

/// Venue acknowledgement of a placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueAck {
    pub venue_order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub filled_quantity: Size,
    #[serde(default)]
    pub avg_price: Option<Price>,
}

// ============================================================================
// VenueClient
// ============================================================================

/// Transport to a trading venue.
pub trait VenueClient: Send + Sync {
    fn name(&self) -> &str;

    /// Read-only symbol metadata. Never places anything.
    fn symbol_rules<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExecutorResult<SymbolRules>>;

    fn place_order<'a>(&'a self, order: &'a VenueOrder) -> BoxFuture<'a, ExecutorResult<VenueAck>>;

    fn cancel_order<'a>(&'a self, client_id: &'a ClientOrderId)
        -> BoxFuture<'a, ExecutorResult<()>>;
}

/// Arc wrapper for VenueClient trait objects.
pub type DynVenueClient = Arc<dyn VenueClient>;

// ============================================================================
// ScriptedVenue
// ============================================================================

/// Scripted answer to one `place_order` call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this acknowledgement.
    Ack(VenueAck),
    /// Fill the whole order at its price, or the symbol's reference price.
    Fill,
    /// Fail with this error.
    Fail(ExecutorError),
    /// Sleep before filling; longer than the call timeout means a timeout.
    Hang(Duration),
}

/// In-process venue double.
///
/// Replies are consumed in order; once the script runs out every placement
/// fills. Every call is recorded for verification.
#[derive(Debug, Default)]
pub struct ScriptedVenue {
    rules: Mutex<HashMap<String, SymbolRules>>,
    rules_failures: Mutex<VecDeque<ExecutorError>>,
    place_replies: Mutex<VecDeque<ScriptedReply>>,
    cancel_failures: Mutex<VecDeque<ExecutorError>>,
    placed: Mutex<Vec<VenueOrder>>,
    cancelled: Mutex<Vec<ClientOrderId>>,
    rules_calls: AtomicUsize,
    place_calls: AtomicUsize,
    next_order_id: AtomicUsize,
}

impl ScriptedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(self, rules: SymbolRules) -> Self {
        self.rules.lock().insert(rules.symbol.clone(), rules);
        self
    }

    pub fn push_rules_failure(&self, error: ExecutorError) {
        self.rules_failures.lock().push_back(error);
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.place_replies.lock().push_back(reply);
    }

    pub fn push_replies(&self, replies: impl IntoIterator<Item = ScriptedReply>) {
        self.place_replies.lock().extend(replies);
    }

    pub fn push_cancel_failure(&self, error: ExecutorError) {
        self.cancel_failures.lock().push_back(error);
    }

    /// Every placement attempt, retries included.
    pub fn placed(&self) -> Vec<VenueOrder> {
        self.placed.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<ClientOrderId> {
        self.cancelled.lock().clone()
    }

    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn rules_calls(&self) -> usize {
        self.rules_calls.load(Ordering::SeqCst)
    }

    fn fill_ack(&self, order: &VenueOrder) -> VenueAck {
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
        let price = order.price.or_else(|| {
            self.rules
                .lock()
                .get(&order.symbol)
                .and_then(|r| r.reference_price)
        });
        VenueAck {
            venue_order_id: format!("sv-{id}"),
            status: OrderStatus::Filled,
            filled_quantity: order.quantity,
            avg_price: price,
        }
    }
}

impl VenueClient for ScriptedVenue {
    fn name(&self) -> &str {
        "scripted"
    }

    fn symbol_rules<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExecutorResult<SymbolRules>> {
        Box::pin(async move {
            self.rules_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.rules_failures.lock().pop_front() {
                return Err(error);
            }
            self.rules
                .lock()
                .get(symbol)
                .cloned()
                .ok_or_else(|| ExecutorError::Rejected(format!("unknown symbol {symbol}")))
        })
    }

    fn place_order<'a>(&'a self, order: &'a VenueOrder) -> BoxFuture<'a, ExecutorResult<VenueAck>> {
        Box::pin(async move {
            self.place_calls.fetch_add(1, Ordering::SeqCst);
            self.placed.lock().push(order.clone());
            let reply = self
                .place_replies
                .lock()
                .pop_front()
                .unwrap_or(ScriptedReply::Fill);
            match reply {
                ScriptedReply::Ack(ack) => Ok(ack),
                ScriptedReply::Fill => Ok(self.fill_ack(order)),
                ScriptedReply::Fail(error) => Err(error),
                ScriptedReply::Hang(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(self.fill_ack(order))
                }
            }
        })
    }

    fn cancel_order<'a>(
        &'a self,
        client_id: &'a ClientOrderId,
    ) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(async move {
            if let Some(error) = self.cancel_failures.lock().pop_front() {
                return Err(error);
            }
            self.cancelled.lock().push(client_id.clone());
            Ok(())
        })
    }
}
