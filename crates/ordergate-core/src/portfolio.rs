//! Read-only portfolio snapshot.
//!
//! Supplied by an external provider at batch start. Everything the risk
//! checks need across calls (day boundary, peak equity, recent submissions)
//! lives here rather than inside the checker.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimal::Price;

/// One open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Signed quantity: positive long, negative short.
    pub quantity: Decimal,
    pub avg_entry_price: Price,
}

impl PositionSnapshot {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Portfolio as-of batch start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    #[serde(default)]
    pub positions: BTreeMap<String, PositionSnapshot>,
    #[serde(default)]
    pub mark_prices: BTreeMap<String, Price>,
    #[serde(default)]
    pub realized_pnl_today: Decimal,
    #[serde(default)]
    pub equity: Decimal,
    #[serde(default)]
    pub cash: Decimal,
    /// Equity at the last day-boundary reset; basis for percentage loss limits.
    #[serde(default)]
    pub start_of_day_equity: Option<Decimal>,
    #[serde(default)]
    pub peak_equity: Decimal,
    #[serde(default = "today")]
    pub trading_day: NaiveDate,
    /// Submission timestamps used by the sliding-window rate limit.
    #[serde(default)]
    pub recent_submissions: Vec<DateTime<Utc>>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self {
            positions: BTreeMap::new(),
            mark_prices: BTreeMap::new(),
            realized_pnl_today: Decimal::ZERO,
            equity: Decimal::ZERO,
            cash: Decimal::ZERO,
            start_of_day_equity: None,
            peak_equity: Decimal::ZERO,
            trading_day: today(),
            recent_submissions: Vec::new(),
        }
    }
}

impl PortfolioState {
    /// Signed quantity held in `symbol` (zero when flat or unknown).
    pub fn position_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Best known valuation price: mark price, else average entry.
    pub fn reference_price(&self, symbol: &str) -> Option<Price> {
        self.mark_prices
            .get(symbol)
            .copied()
            .or_else(|| self.positions.get(symbol).map(|p| p.avg_entry_price))
            .filter(Price::is_positive)
    }

    /// Number of non-flat positions.
    pub fn open_position_count(&self) -> usize {
        self.positions.values().filter(|p| !p.is_flat()).count()
    }

    /// Absolute exposure of `symbol` at its reference price.
    ///
    /// `None` when the symbol is held but cannot be priced.
    pub fn symbol_exposure(&self, symbol: &str) -> Option<Decimal> {
        let qty = self.position_quantity(symbol);
        if qty.is_zero() {
            return Some(Decimal::ZERO);
        }
        self.reference_price(symbol)
            .map(|price| (qty * price.inner()).abs())
    }

    /// Equity used as the percentage daily-loss basis.
    pub fn loss_basis_equity(&self) -> Decimal {
        self.start_of_day_equity.unwrap_or(self.equity)
    }
}
