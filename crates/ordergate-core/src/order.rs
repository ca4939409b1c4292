//! Order requests and identifiers.
//!
//! An `OrderRequest` is produced upstream by strategy and sizing logic; the
//! pipeline never computes size or direction, and never mutates a request it
//! was handed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns 1 for buy, -1 for sell.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Client order ID for idempotency.
///
/// The same id is reused for every retry of one submission, so a venue that
/// already accepted the first attempt can deduplicate the rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `og_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("og_{ts}_{}", &uuid[..8]))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A fully-formed proposed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Size,
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub client_id: Option<ClientOrderId>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Size) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            client_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: Size, price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit,
            price: Some(price),
            client_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder-style client id override. Consumes `self`, so an order handed
    /// to the pipeline by reference is never altered.
    pub fn with_client_id(mut self, id: ClientOrderId) -> Self {
        self.client_id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Quantity with the side's sign applied.
    pub fn signed_quantity(&self) -> Decimal {
        self.quantity.inner() * self.side.sign()
    }

    /// Structural validation: positive quantity, non-empty symbol, and a
    /// positive price wherever one is given or required.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(CoreError::InvalidOrder("symbol is empty".to_string()));
        }
        if !self.quantity.is_positive() {
            return Err(CoreError::InvalidSize(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(CoreError::InvalidOrder(
                "limit order requires a price".to_string(),
            )),
            (_, Some(price)) if !price.is_positive() => Err(CoreError::InvalidPrice(format!(
                "price must be positive, got {price}"
            ))),
            _ => Ok(()),
        }
    }

    /// One-line description used in audit input summaries.
    pub fn summary(&self) -> String {
        let price = self
            .price
            .map(|p| format!(" @ {p}"))
            .unwrap_or_default();
        format!(
            "{} {} {} {}{}",
            self.order_type, self.side, self.quantity, self.symbol, price
        )
    }
}
