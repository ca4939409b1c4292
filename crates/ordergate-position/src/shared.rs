//! In-process portfolio ledger.
//!
//! Single writer, many readers: every mutation takes the write lock for its
//! whole duration, and `snapshot` clones under the read lock, so a reader
//! never observes a half-applied fill.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ordergate_core::{ClientOrderId, Fill, PortfolioState, PositionSnapshot, Price};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{PositionError, PositionResult};
use crate::provider::PortfolioProvider;

/// Submission timestamps older than this are pruned on every append.
const DEFAULT_SUBMISSION_RETENTION_SECS: i64 = 3600;

/// Shared portfolio with fill-driven bookkeeping.
pub struct SharedPortfolio {
    state: RwLock<PortfolioState>,
    /// Client ids whose fills were already applied, with the trading day of
    /// application. Pruned on day roll to the current and previous day.
    applied: Mutex<HashMap<ClientOrderId, NaiveDate>>,
    submission_retention: Duration,
}

impl SharedPortfolio {
    pub fn new(initial: PortfolioState) -> Self {
        Self {
            state: RwLock::new(initial),
            applied: Mutex::new(HashMap::new()),
            submission_retention: Duration::seconds(DEFAULT_SUBMISSION_RETENTION_SECS),
        }
    }

    /// Keep submission timestamps for at least `secs` (the rate window).
    #[must_use]
    pub fn with_submission_retention(mut self, secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX / 1000);
        self.submission_retention = Duration::seconds(secs.max(1));
        self
    }

    // ========================================================================
    // Fills
    // ========================================================================

    /// Apply a fill to positions, cash and realized PnL.
    ///
    /// A second fill for the same client id is ignored and returns `false`.
    pub fn apply_fill(&self, fill: &Fill) -> PositionResult<bool> {
        if !fill.price.is_positive() {
            return Err(PositionError::InvalidFill(format!(
                "non-positive price {} for {}",
                fill.price, fill.client_id
            )));
        }
        if fill.filled_quantity.is_zero() {
            return Ok(false);
        }

        let mut state = self.state.write();
        {
            let mut applied = self.applied.lock();
            if applied.contains_key(&fill.client_id) {
                warn!(client_id = %fill.client_id, "Duplicate fill ignored");
                return Ok(false);
            }
            applied.insert(fill.client_id.clone(), state.trading_day);
        }

        let delta = fill.filled_quantity.inner() * fill.side.sign();

        let current = state
            .positions
            .get(&fill.symbol)
            .copied()
            .unwrap_or(PositionSnapshot {
                quantity: Decimal::ZERO,
                avg_entry_price: Price::ZERO,
            });
        let (next, realized) = apply_delta(current, delta, fill.price);

        if next.is_flat() {
            state.positions.remove(&fill.symbol);
        } else {
            state.positions.insert(fill.symbol.clone(), next);
        }
        state.cash -= delta * fill.price.inner();
        state.realized_pnl_today += realized;
        state.equity += realized;
        if state.equity > state.peak_equity {
            state.peak_equity = state.equity;
        }
        state
            .mark_prices
            .entry(fill.symbol.clone())
            .or_insert(fill.price);

        debug!(
            client_id = %fill.client_id,
            symbol = %fill.symbol,
            quantity = %next.quantity,
            avg_entry = %next.avg_entry_price,
            %realized,
            "Fill applied"
        );
        Ok(true)
    }

    /// Add externally computed realized PnL (fees, funding).
    pub fn record_realized_pnl(&self, amount: Decimal) {
        let mut state = self.state.write();
        state.realized_pnl_today += amount;
        state.equity += amount;
        if state.equity > state.peak_equity {
            state.peak_equity = state.equity;
        }
    }

    // ========================================================================
    // Marks, equity and day boundary
    // ========================================================================

    pub fn update_mark(&self, symbol: &str, price: Price) {
        if price.is_positive() {
            self.state.write().mark_prices.insert(symbol.to_string(), price);
        }
    }

    pub fn set_equity(&self, equity: Decimal) {
        let mut state = self.state.write();
        state.equity = equity;
        if equity > state.peak_equity {
            state.peak_equity = equity;
        }
        if state.start_of_day_equity.is_none() {
            state.start_of_day_equity = Some(equity);
        }
    }

    /// Reset daily counters when `day` is after the current trading day.
    ///
    /// Fill dedup entries older than the day being closed are dropped.
    /// Returns true when a reset happened.
    pub fn roll_day(&self, day: NaiveDate) -> bool {
        let mut state = self.state.write();
        if day <= state.trading_day {
            return false;
        }
        let closing = state.trading_day;
        let pruned = {
            let mut applied = self.applied.lock();
            let before = applied.len();
            applied.retain(|_, applied_on| *applied_on >= closing);
            before - applied.len()
        };
        info!(
            from = %state.trading_day,
            to = %day,
            realized_pnl = %state.realized_pnl_today,
            pruned_fill_ids = pruned,
            "Trading day rolled"
        );
        state.trading_day = day;
        state.realized_pnl_today = Decimal::ZERO;
        state.start_of_day_equity = Some(state.equity);
        true
    }

    // ========================================================================
    // Submissions
    // ========================================================================

    pub fn record_submission(&self, at: DateTime<Utc>) {
        let mut state = self.state.write();
        state.recent_submissions.push(at);
        state.recent_submissions.sort_unstable();
        let cutoff = at - self.submission_retention;
        state.recent_submissions.retain(|ts| *ts > cutoff);
    }

    /// Client ids currently held for fill dedup.
    pub fn tracked_fill_count(&self) -> usize {
        self.applied.lock().len()
    }

    pub fn submission_count(&self) -> usize {
        self.state.read().recent_submissions.len()
    }
}

impl Default for SharedPortfolio {
    fn default() -> Self {
        Self::new(PortfolioState::default())
    }
}

impl PortfolioProvider for SharedPortfolio {
    fn snapshot(&self) -> PortfolioState {
        self.state.read().clone()
    }

    fn on_submitted(&self, at: DateTime<Utc>) {
        self.record_submission(at);
    }

    fn on_fill(&self, fill: &Fill) {
        if let Err(e) = self.apply_fill(fill) {
            warn!(client_id = %fill.client_id, error = %e, "Fill not applied");
        }
    }
}

/// Apply a signed quantity change at `price`.
///
/// Same direction: weighted average entry. Opposite direction: reduce, close
/// or flip; a flip enters the remainder at `price`. Returns the new position
/// and the realized PnL of the closed part.
fn apply_delta(
    current: PositionSnapshot,
    delta: Decimal,
    price: Price,
) -> (PositionSnapshot, Decimal) {
    let qty = current.quantity;
    if qty.is_zero() || qty.is_sign_positive() == delta.is_sign_positive() {
        let new_qty = qty + delta;
        let old_notional = qty.abs() * current.avg_entry_price.inner();
        let fill_notional = delta.abs() * price.inner();
        let avg = if new_qty.is_zero() {
            Price::ZERO
        } else {
            Price::new((old_notional + fill_notional) / new_qty.abs())
        };
        return (
            PositionSnapshot {
                quantity: new_qty,
                avg_entry_price: avg,
            },
            Decimal::ZERO,
        );
    }

    let closed = delta.abs().min(qty.abs());
    let direction = if qty.is_sign_positive() {
        Decimal::ONE
    } else {
        Decimal::NEGATIVE_ONE
    };
    let realized = (price.inner() - current.avg_entry_price.inner()) * closed * direction;
    let new_qty = qty + delta;

    let next = if new_qty.is_zero() {
        PositionSnapshot {
            quantity: Decimal::ZERO,
            avg_entry_price: Price::ZERO,
        }
    } else if new_qty.is_sign_positive() == qty.is_sign_positive() {
        PositionSnapshot {
            quantity: new_qty,
            avg_entry_price: current.avg_entry_price,
        }
    } else {
        PositionSnapshot {
            quantity: new_qty,
            avg_entry_price: price,
        }
    };
    (next, realized)
}
