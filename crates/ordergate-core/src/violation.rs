//! Structured denials.
//!
//! Denials are values, not errors. Callers match on the closed enums below;
//! every variant carries a stable machine code and a human-readable reason.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::environment::Routing;
use crate::execution::ViolationSummary;
use crate::order::ClientOrderId;

/// Mode-routing and live-gate violations. Always deny, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum SafetyViolation {
    #[error("paper forbids non-simulated placement (intent: {intent})")]
    #[serde(rename = "SAFETY_PAPER_NON_SIMULATED")]
    PaperNonSimulated { intent: Routing },

    #[error("testnet is dry-run only")]
    #[serde(rename = "SAFETY_TESTNET_LIVE_ROUTING")]
    TestnetLiveRouting,

    #[error("live trading disabled")]
    #[serde(rename = "LIVE_TRADING_DISABLED")]
    LiveTradingDisabled,

    #[error("live mode not armed")]
    #[serde(rename = "LIVE_NOT_ARMED")]
    LiveNotArmed,

    #[error("confirm token invalid")]
    #[serde(rename = "LIVE_CONFIRM_TOKEN_INVALID")]
    ConfirmTokenInvalid,
}

impl SafetyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PaperNonSimulated { .. } => "SAFETY_PAPER_NON_SIMULATED",
            Self::TestnetLiveRouting => "SAFETY_TESTNET_LIVE_ROUTING",
            Self::LiveTradingDisabled => "LIVE_TRADING_DISABLED",
            Self::LiveNotArmed => "LIVE_NOT_ARMED",
            Self::ConfirmTokenInvalid => "LIVE_CONFIRM_TOKEN_INVALID",
        }
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Category key used in violation summaries.
    pub fn category(&self) -> &'static str {
        match self {
            Self::PaperNonSimulated { .. } | Self::TestnetLiveRouting => "mode_routing",
            Self::LiveTradingDisabled | Self::LiveNotArmed | Self::ConfirmTokenInvalid => {
                "live_gate"
            }
        }
    }
}

/// Risk limit category. Each category has its own enforcement switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Validation,
    PriceData,
    OrderNotional,
    SymbolExposure,
    TotalExposure,
    OpenPositions,
    DailyLoss,
    RateLimit,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 8] = [
        Self::Validation,
        Self::PriceData,
        Self::OrderNotional,
        Self::SymbolExposure,
        Self::TotalExposure,
        Self::OpenPositions,
        Self::DailyLoss,
        Self::RateLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::PriceData => "price_data",
            Self::OrderNotional => "order_notional",
            Self::SymbolExposure => "symbol_exposure",
            Self::TotalExposure => "total_exposure",
            Self::OpenPositions => "open_positions",
            Self::DailyLoss => "daily_loss",
            Self::RateLimit => "rate_limit",
        }
    }

    /// Validation and price-data failures can never be observed-only.
    pub fn always_enforced(&self) -> bool {
        matches!(self, Self::Validation | Self::PriceData)
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable risk code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCode {
    #[serde(rename = "RISK_INVALID_ORDER")]
    InvalidOrder,
    #[serde(rename = "RISK_PRICE_UNAVAILABLE")]
    PriceUnavailable,
    #[serde(rename = "RISK_ORDER_NOTIONAL_EXCEEDED")]
    OrderNotionalExceeded,
    #[serde(rename = "RISK_SYMBOL_EXPOSURE_EXCEEDED")]
    SymbolExposureExceeded,
    #[serde(rename = "RISK_TOTAL_EXPOSURE_EXCEEDED")]
    TotalExposureExceeded,
    #[serde(rename = "RISK_MAX_POSITIONS_EXCEEDED")]
    MaxPositionsExceeded,
    #[serde(rename = "RISK_DAILY_LOSS_BREACH")]
    DailyLossBreach,
    #[serde(rename = "RISK_RATE_LIMITED")]
    RateLimited,
}

impl RiskCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidOrder => "RISK_INVALID_ORDER",
            Self::PriceUnavailable => "RISK_PRICE_UNAVAILABLE",
            Self::OrderNotionalExceeded => "RISK_ORDER_NOTIONAL_EXCEEDED",
            Self::SymbolExposureExceeded => "RISK_SYMBOL_EXPOSURE_EXCEEDED",
            Self::TotalExposureExceeded => "RISK_TOTAL_EXPOSURE_EXCEEDED",
            Self::MaxPositionsExceeded => "RISK_MAX_POSITIONS_EXCEEDED",
            Self::DailyLossBreach => "RISK_DAILY_LOSS_BREACH",
            Self::RateLimited => "RISK_RATE_LIMITED",
        }
    }

    pub fn category(&self) -> RiskCategory {
        match self {
            Self::InvalidOrder => RiskCategory::Validation,
            Self::PriceUnavailable => RiskCategory::PriceData,
            Self::OrderNotionalExceeded => RiskCategory::OrderNotional,
            Self::SymbolExposureExceeded => RiskCategory::SymbolExposure,
            Self::TotalExposureExceeded => RiskCategory::TotalExposure,
            Self::MaxPositionsExceeded => RiskCategory::OpenPositions,
            Self::DailyLossBreach => RiskCategory::DailyLoss,
            Self::RateLimited => RiskCategory::RateLimit,
        }
    }
}

impl fmt::Display for RiskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violated risk limit for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskViolation {
    pub code: RiskCode,
    pub category: RiskCategory,
    /// Position of the order in the slice passed to the checker.
    pub order_index: usize,
    /// Offending value (notional, exposure, count, loss).
    pub metric: Decimal,
    pub threshold: Decimal,
    pub message: String,
    /// Present only for rate-limit denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// False when the category is configured observe-only.
    pub enforced: bool,
}

impl RiskViolation {
    pub fn new(
        code: RiskCode,
        order_index: usize,
        metric: Decimal,
        threshold: Decimal,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category: code.category(),
            order_index,
            metric,
            threshold,
            message: message.into(),
            retry_after_ms: None,
            enforced: true,
        }
    }

    pub fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    /// Rate limiting is a soft, retryable denial; everything else is a hard
    /// limit breach.
    pub fn is_hard(&self) -> bool {
        self.code != RiskCode::RateLimited
    }
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Inputs and projections captured so a decision can be reproduced offline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub evaluated_orders: usize,
    pub realized_pnl_today: Decimal,
    pub equity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_loss_limit: Option<Decimal>,
    pub total_exposure_before: Decimal,
    pub total_exposure_after: Decimal,
    /// Held symbols left out of `total_exposure_before` for lack of a price.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unpriced_symbols: Vec<String>,
    pub open_positions_before: usize,
    pub open_positions_after: usize,
    /// Peak count of prior submissions seen by any order's rate window.
    pub submissions_in_window: usize,
    pub symbol_exposure_after: BTreeMap<String, Decimal>,
}

/// Risk verdict for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRiskResult {
    pub order_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientOrderId>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<Decimal>,
    pub violations: Vec<RiskViolation>,
}

impl OrderRiskResult {
    /// True violation state, regardless of enforcement.
    pub fn allowed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether the order may proceed once enforcement is applied.
    pub fn admitted(&self) -> bool {
        self.violations.iter().all(|v| !v.enforced)
    }

    /// First enforced violation, which becomes the denial reason.
    pub fn blocking_violation(&self) -> Option<&RiskViolation> {
        self.violations.iter().find(|v| v.enforced)
    }
}

/// Aggregate result of one risk check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskCheckResult {
    /// False when any order has any violation, enforced or not.
    pub allowed: bool,
    /// Daily-loss circuit breaker tripped for this batch.
    pub breaker_tripped: bool,
    pub orders: Vec<OrderRiskResult>,
    pub violations: Vec<RiskViolation>,
    pub metrics: RiskMetrics,
}

impl RiskCheckResult {
    pub fn order(&self, index: usize) -> Option<&OrderRiskResult> {
        self.orders.iter().find(|o| o.order_index == index)
    }

    pub fn admitted_indices(&self) -> Vec<usize> {
        self.orders
            .iter()
            .filter(|o| o.admitted())
            .map(|o| o.order_index)
            .collect()
    }

    pub fn summary(&self) -> ViolationSummary {
        let mut summary = ViolationSummary::default();
        for v in &self.violations {
            summary.record(v.category.as_str());
        }
        summary
    }
}
