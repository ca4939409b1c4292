//! Risk admission control.
//!
//! Evaluates every limit for every order and aggregates the result; nothing
//! short-circuits, so operators always see the complete violation picture.
//!
//! # Checks
//!
//! ## Per-order
//! - Structural validation (always enforced)
//! - Price resolution for notional: order price, mark price, average entry
//!   (always enforced; an unpriced order is denied)
//! - Order notional cap
//!
//! ## Projected portfolio
//! - Per-symbol exposure cap
//! - Total exposure cap; an exposure-increasing order is unpriced while any
//!   other held symbol has no usable price
//! - Open-position count
//!
//! ## Global
//! - Daily-loss circuit breaker: attached to every order in the batch
//! - Sliding-window rate limit with a retry-after hint
//!
//! Projections accumulate across the batch, in input order, for orders that
//! will actually proceed. The checker is pure: all carried state (day
//! boundary, submission history) comes from the supplied `PortfolioState`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use ordergate_core::{
    OrderRequest, OrderRiskResult, PortfolioState, Price, RiskCheckResult, RiskCode, RiskMetrics,
    RiskViolation,
};
use rust_decimal::Decimal;
use tracing::{debug, error, trace, warn};

use crate::limits::{Enforcement, RiskLimitsConfig};

/// Per-order and aggregate risk verdicts for a batch.
pub trait RiskAdmissionControl: Send + Sync {
    /// Must be deterministic: identical inputs yield identical results.
    fn check(
        &self,
        orders: &[OrderRequest],
        portfolio: &PortfolioState,
        cfg: &RiskLimitsConfig,
    ) -> RiskCheckResult;
}

/// Default `RiskAdmissionControl` driven entirely by `RiskLimitsConfig`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitsRiskControl;

impl LimitsRiskControl {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

// ============================================================================
// Daily-loss Breaker
// ============================================================================

#[derive(Debug, Clone)]
struct Breaker {
    loss: Decimal,
    threshold: Decimal,
    message: String,
}

fn daily_loss_breaker(portfolio: &PortfolioState, cfg: &RiskLimitsConfig) -> Option<Breaker> {
    let pnl = portfolio.realized_pnl_today;
    let loss = (-pnl).max(Decimal::ZERO);

    if let Some(limit) = cfg.max_daily_loss_abs {
        if pnl <= -limit {
            return Some(Breaker {
                loss,
                threshold: limit,
                message: format!("realized pnl {pnl} breaches daily loss limit {limit}"),
            });
        }
    }

    if let Some(pct) = cfg.max_daily_loss_pct {
        let basis = portfolio.loss_basis_equity();
        // Without an equity basis the percentage limit cannot be evaluated.
        if basis <= Decimal::ZERO {
            return Some(Breaker {
                loss,
                threshold: Decimal::ZERO,
                message: format!(
                    "no positive equity basis for {pct}% daily loss limit (basis {basis})"
                ),
            });
        }
        let limit = basis * pct / Decimal::ONE_HUNDRED;
        if pnl <= -limit {
            return Some(Breaker {
                loss,
                threshold: limit,
                message: format!(
                    "realized pnl {pnl} breaches daily loss limit {limit} ({pct}% of {basis})"
                ),
            });
        }
    }

    None
}

fn effective_daily_loss_limit(portfolio: &PortfolioState, cfg: &RiskLimitsConfig) -> Option<Decimal> {
    let pct_limit = cfg.max_daily_loss_pct.and_then(|pct| {
        let basis = portfolio.loss_basis_equity();
        (basis > Decimal::ZERO).then(|| basis * pct / Decimal::ONE_HUNDRED)
    });
    match (cfg.max_daily_loss_abs, pct_limit) {
        (Some(a), Some(p)) => Some(a.min(p)),
        (a, p) => a.or(p),
    }
}

// ============================================================================
// Batch Projection
// ============================================================================

/// Portfolio as it would look after the admitted orders seen so far.
#[derive(Debug, Clone)]
struct Projection {
    quantities: BTreeMap<String, Decimal>,
    exposures: BTreeMap<String, Decimal>,
    total_exposure: Decimal,
    /// Held symbols whose exposure is unknown until an order prices them.
    unpriced: BTreeSet<String>,
    open_positions: usize,
    submissions: Vec<DateTime<Utc>>,
}

/// Post-trade state of one symbol, applied only if the order is admitted.
#[derive(Debug, Clone)]
struct Staged {
    symbol: String,
    quantity: Decimal,
    exposure: Decimal,
    timestamp: DateTime<Utc>,
}

impl Projection {
    fn from_portfolio(portfolio: &PortfolioState) -> Self {
        let mut quantities = BTreeMap::new();
        let mut exposures = BTreeMap::new();
        let mut total_exposure = Decimal::ZERO;
        let mut unpriced = BTreeSet::new();

        for (symbol, position) in &portfolio.positions {
            quantities.insert(symbol.clone(), position.quantity);
            match portfolio.symbol_exposure(symbol) {
                Some(exposure) => {
                    exposures.insert(symbol.clone(), exposure);
                    total_exposure += exposure;
                }
                None => {
                    warn!(symbol = %symbol, "Open position has no usable price, total exposure unknown");
                    unpriced.insert(symbol.clone());
                }
            }
        }

        let mut submissions = portfolio.recent_submissions.clone();
        submissions.sort();

        Self {
            quantities,
            exposures,
            total_exposure,
            unpriced,
            open_positions: portfolio.open_position_count(),
            submissions,
        }
    }

    fn quantity(&self, symbol: &str) -> Decimal {
        self.quantities.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    fn exposure(&self, symbol: &str) -> Decimal {
        self.exposures.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Submissions in `(ts - window, ts]` and the oldest of them.
    fn window(&self, ts: DateTime<Utc>, window: Duration) -> (usize, Option<DateTime<Utc>>) {
        let start = ts - window;
        let mut in_window = self.submissions.iter().filter(|t| **t > start && **t <= ts);
        let oldest = in_window.next().copied();
        let count = oldest.map_or(0, |_| 1 + in_window.count());
        (count, oldest)
    }

    fn commit(&mut self, staged: Staged) {
        let old_quantity = self.quantity(&staged.symbol);
        let old_exposure = self.exposure(&staged.symbol);

        self.total_exposure = self.total_exposure - old_exposure + staged.exposure;
        match (old_quantity.is_zero(), staged.quantity.is_zero()) {
            (true, false) => self.open_positions += 1,
            (false, true) => self.open_positions = self.open_positions.saturating_sub(1),
            _ => {}
        }

        self.unpriced.remove(&staged.symbol);
        self.quantities.insert(staged.symbol.clone(), staged.quantity);
        self.exposures.insert(staged.symbol, staged.exposure);
        let at = self.submissions.partition_point(|t| *t <= staged.timestamp);
        self.submissions.insert(at, staged.timestamp);
    }
}

fn resolve_price(order: &OrderRequest, portfolio: &PortfolioState) -> Option<Price> {
    order
        .price
        .filter(Price::is_positive)
        .or_else(|| portfolio.reference_price(&order.symbol))
}

fn retry_after_ms(oldest: Option<DateTime<Utc>>, ts: DateTime<Utc>, window: Duration) -> u64 {
    let wait = match oldest {
        Some(oldest) => oldest + window - ts,
        None => window,
    };
    u64::try_from(wait.num_milliseconds()).unwrap_or(0).max(1)
}

// ============================================================================
// Checker
// ============================================================================

impl LimitsRiskControl {
    /// Limit checks that need a resolved price. Returns the staged
    /// post-trade state for the symbol.
    fn check_priced(
        &self,
        index: usize,
        order: &OrderRequest,
        price: Price,
        projection: &Projection,
        cfg: &RiskLimitsConfig,
        violations: &mut Vec<RiskViolation>,
    ) -> (Decimal, Staged) {
        let notional = order.quantity.notional(price);
        let old_quantity = projection.quantity(&order.symbol);
        let new_quantity = old_quantity + order.signed_quantity();
        let new_exposure = (new_quantity * price.inner()).abs();
        let increases = new_quantity.abs() > old_quantity.abs();

        if let Some(cap) = cfg.max_order_notional {
            if notional > cap {
                violations.push(RiskViolation::new(
                    RiskCode::OrderNotionalExceeded,
                    index,
                    notional,
                    cap,
                    format!("order notional {notional} > {cap}"),
                ));
            }
        }

        // Exposure-reducing orders pass even when the book is already over a cap.
        if let Some(cap) = cfg.max_symbol_exposure {
            if increases && new_exposure > cap {
                violations.push(RiskViolation::new(
                    RiskCode::SymbolExposureExceeded,
                    index,
                    new_exposure,
                    cap,
                    format!("{} exposure {new_exposure} > {cap}", order.symbol),
                ));
            }
        }

        if let Some(cap) = cfg.max_total_exposure {
            let unknown: Vec<&str> = projection
                .unpriced
                .iter()
                .map(String::as_str)
                .filter(|s| *s != order.symbol)
                .collect();
            let total = projection.total_exposure - projection.exposure(&order.symbol) + new_exposure;
            if increases && !unknown.is_empty() {
                violations.push(RiskViolation::new(
                    RiskCode::PriceUnavailable,
                    index,
                    Decimal::ZERO,
                    cap,
                    format!("total exposure unknown, no price for held {}", unknown.join(", ")),
                ));
            } else if increases && total > cap {
                violations.push(RiskViolation::new(
                    RiskCode::TotalExposureExceeded,
                    index,
                    total,
                    cap,
                    format!("total exposure {total} > {cap}"),
                ));
            }
        }

        if let Some(max) = cfg.max_open_positions {
            let opens_new = old_quantity.is_zero() && !new_quantity.is_zero();
            let after = projection.open_positions + 1;
            if opens_new && after > max {
                violations.push(RiskViolation::new(
                    RiskCode::MaxPositionsExceeded,
                    index,
                    Decimal::from(after),
                    Decimal::from(max),
                    format!("open positions {after} > {max}"),
                ));
            }
        }

        let staged = Staged {
            symbol: order.symbol.clone(),
            quantity: new_quantity,
            exposure: new_exposure,
            timestamp: order.timestamp,
        };
        (notional, staged)
    }
}

impl RiskAdmissionControl for LimitsRiskControl {
    fn check(
        &self,
        orders: &[OrderRequest],
        portfolio: &PortfolioState,
        cfg: &RiskLimitsConfig,
    ) -> RiskCheckResult {
        let mut projection = Projection::from_portfolio(portfolio);
        let window = cfg.rate_window();
        let breaker = daily_loss_breaker(portfolio, cfg);

        if let Some(breaker) = &breaker {
            if !orders.is_empty() {
                error!(
                    realized_pnl_today = %portfolio.realized_pnl_today,
                    threshold = %breaker.threshold,
                    orders = orders.len(),
                    "Daily loss circuit breaker tripped, denying entire batch"
                );
            }
        }

        let mut metrics = RiskMetrics {
            evaluated_orders: orders.len(),
            realized_pnl_today: portfolio.realized_pnl_today,
            equity: portfolio.equity,
            daily_loss_limit: effective_daily_loss_limit(portfolio, cfg),
            total_exposure_before: projection.total_exposure,
            unpriced_symbols: projection.unpriced.iter().cloned().collect(),
            open_positions_before: projection.open_positions,
            ..Default::default()
        };

        let mut results = Vec::with_capacity(orders.len());

        for (index, order) in orders.iter().enumerate() {
            let mut violations = Vec::new();
            let mut notional = None;
            let mut staged = None;

            match order.validate() {
                Err(e) => violations.push(RiskViolation::new(
                    RiskCode::InvalidOrder,
                    index,
                    Decimal::ZERO,
                    Decimal::ZERO,
                    e.to_string(),
                )),
                Ok(()) => match resolve_price(order, portfolio) {
                    None => violations.push(RiskViolation::new(
                        RiskCode::PriceUnavailable,
                        index,
                        Decimal::ZERO,
                        Decimal::ZERO,
                        format!("no price available to value {} order", order.symbol),
                    )),
                    Some(price) => {
                        let (n, s) =
                            self.check_priced(index, order, price, &projection, cfg, &mut violations);
                        notional = Some(n);
                        staged = Some(s);
                    }
                },
            }

            if let Some(breaker) = &breaker {
                violations.push(RiskViolation::new(
                    RiskCode::DailyLossBreach,
                    index,
                    breaker.loss,
                    breaker.threshold,
                    breaker.message.clone(),
                ));
            }

            if let Some(max) = cfg.max_orders_per_window {
                let (count, oldest) = projection.window(order.timestamp, window);
                metrics.submissions_in_window = metrics.submissions_in_window.max(count);
                if count >= max {
                    let retry_after = retry_after_ms(oldest, order.timestamp, window);
                    violations.push(
                        RiskViolation::new(
                            RiskCode::RateLimited,
                            index,
                            Decimal::from(count + 1),
                            Decimal::from(max),
                            format!(
                                "{count} submissions in the last {}s, limit {max}",
                                cfg.rate_window_secs
                            ),
                        )
                        .with_retry_after(retry_after),
                    );
                }
            }

            for violation in &mut violations {
                violation.enforced = cfg.enforcement_for(violation.category) == Enforcement::Block;
                debug!(
                    order_index = index,
                    symbol = %order.symbol,
                    code = violation.code.as_str(),
                    metric = %violation.metric,
                    threshold = %violation.threshold,
                    enforced = violation.enforced,
                    "Risk violation"
                );
            }

            let result = OrderRiskResult {
                order_index: index,
                client_id: order.client_id.clone(),
                symbol: order.symbol.clone(),
                notional,
                violations,
            };

            if result.admitted() {
                if let Some(staged) = staged {
                    projection.commit(staged);
                }
                trace!(order_index = index, symbol = %order.symbol, "Risk admission passed");
            }

            results.push(result);
        }

        metrics.total_exposure_after = projection.total_exposure;
        metrics.open_positions_after = projection.open_positions;
        for order in orders {
            metrics
                .symbol_exposure_after
                .insert(order.symbol.clone(), projection.exposure(&order.symbol));
        }

        let violations: Vec<RiskViolation> = results
            .iter()
            .flat_map(|r| r.violations.iter().cloned())
            .collect();

        RiskCheckResult {
            allowed: violations.is_empty(),
            breaker_tripped: breaker.is_some(),
            orders: results,
            violations,
            metrics,
        }
    }
}
