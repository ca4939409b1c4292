//! Risk limit configuration.
//!
//! Every cap is optional; an unset cap is never checked. Enforcement is
//! decided per category so a category can be watched without blocking.

use std::collections::BTreeMap;

use chrono::Duration;
use ordergate_core::RiskCategory;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// What happens to an order that violates a category's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Deny the order.
    Block,
    /// Let the order proceed and log the violation at warn level.
    Observe,
}

/// Risk limits for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimitsConfig {
    /// Maximum notional of a single order.
    #[serde(default)]
    pub max_order_notional: Option<Decimal>,
    /// Maximum projected absolute exposure per symbol.
    #[serde(default)]
    pub max_symbol_exposure: Option<Decimal>,
    /// Maximum projected absolute exposure across all symbols.
    #[serde(default)]
    pub max_total_exposure: Option<Decimal>,
    /// Maximum number of non-flat positions after the batch.
    #[serde(default)]
    pub max_open_positions: Option<usize>,
    /// Daily-loss breaker, absolute currency amount.
    #[serde(default)]
    pub max_daily_loss_abs: Option<Decimal>,
    /// Daily-loss breaker, percent of start-of-day equity (5 = 5%).
    #[serde(default)]
    pub max_daily_loss_pct: Option<Decimal>,
    /// Submissions allowed inside one rate window.
    #[serde(default)]
    pub max_orders_per_window: Option<usize>,
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Default enforcement for categories without an explicit entry.
    #[serde(default = "default_block_on_violation")]
    pub block_on_violation: bool,
    /// Per-category overrides.
    #[serde(default)]
    pub enforcement: BTreeMap<RiskCategory, Enforcement>,
}

/// Upper bound on the rate window, one year.
const MAX_RATE_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

fn default_rate_window_secs() -> u64 {
    60
}

fn default_block_on_violation() -> bool {
    true
}

impl Default for RiskLimitsConfig {
    fn default() -> Self {
        Self {
            max_order_notional: None,
            max_symbol_exposure: None,
            max_total_exposure: None,
            max_open_positions: None,
            max_daily_loss_abs: None,
            max_daily_loss_pct: None,
            max_orders_per_window: None,
            rate_window_secs: default_rate_window_secs(),
            block_on_violation: default_block_on_violation(),
            enforcement: BTreeMap::new(),
        }
    }
}

impl RiskLimitsConfig {
    /// Config with no caps at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Effective enforcement for `category`.
    ///
    /// Validation and price-data failures always block. An explicit entry
    /// wins next. Otherwise the daily-loss breaker blocks and every other
    /// category follows `block_on_violation`.
    #[must_use]
    pub fn enforcement_for(&self, category: RiskCategory) -> Enforcement {
        if category.always_enforced() {
            return Enforcement::Block;
        }
        if let Some(explicit) = self.enforcement.get(&category) {
            return *explicit;
        }
        match category {
            RiskCategory::DailyLoss => Enforcement::Block,
            _ if self.block_on_violation => Enforcement::Block,
            _ => Enforcement::Observe,
        }
    }

    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::seconds(self.rate_window_secs.min(MAX_RATE_WINDOW_SECS) as i64)
    }

    pub fn validate(&self) -> RiskResult<()> {
        let caps = [
            ("max_order_notional", self.max_order_notional),
            ("max_symbol_exposure", self.max_symbol_exposure),
            ("max_total_exposure", self.max_total_exposure),
            ("max_daily_loss_abs", self.max_daily_loss_abs),
            ("max_daily_loss_pct", self.max_daily_loss_pct),
        ];
        for (name, value) in caps {
            if let Some(v) = value {
                if v < Decimal::ZERO {
                    return Err(RiskError::ConfigError(format!(
                        "{name} must not be negative, got {v}"
                    )));
                }
            }
        }
        if let Some(pct) = self.max_daily_loss_pct {
            if pct > Decimal::ONE_HUNDRED {
                return Err(RiskError::ConfigError(format!(
                    "max_daily_loss_pct is a percentage, got {pct}"
                )));
            }
        }
        if self.max_orders_per_window.is_some() && self.rate_window_secs == 0 {
            return Err(RiskError::ConfigError(
                "rate_window_secs must be positive when max_orders_per_window is set".to_string(),
            ));
        }
        for (category, enforcement) in &self.enforcement {
            if category.always_enforced() && *enforcement == Enforcement::Observe {
                return Err(RiskError::ConfigError(format!(
                    "{category} violations cannot be observe-only"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_blocks_everything() {
        let cfg = RiskLimitsConfig::default();
        for category in RiskCategory::ALL {
            assert_eq!(cfg.enforcement_for(category), Enforcement::Block);
        }
    }

    #[test]
    fn test_observe_only_keeps_daily_loss_blocking() {
        let cfg = RiskLimitsConfig {
            block_on_violation: false,
            ..Default::default()
        };
        assert_eq!(
            cfg.enforcement_for(RiskCategory::OrderNotional),
            Enforcement::Observe
        );
        assert_eq!(cfg.enforcement_for(RiskCategory::DailyLoss), Enforcement::Block);
        assert_eq!(cfg.enforcement_for(RiskCategory::Validation), Enforcement::Block);
    }

    #[test]
    fn test_explicit_override_wins() {
        let mut cfg = RiskLimitsConfig {
            block_on_violation: false,
            ..Default::default()
        };
        cfg.enforcement
            .insert(RiskCategory::DailyLoss, Enforcement::Observe);
        cfg.enforcement
            .insert(RiskCategory::RateLimit, Enforcement::Block);
        assert_eq!(cfg.enforcement_for(RiskCategory::DailyLoss), Enforcement::Observe);
        assert_eq!(cfg.enforcement_for(RiskCategory::RateLimit), Enforcement::Block);
    }

    #[test]
    fn test_validate() {
        assert!(RiskLimitsConfig::default().validate().is_ok());

        let negative = RiskLimitsConfig {
            max_order_notional: Some(dec!(-1)),
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let zero_window = RiskLimitsConfig {
            max_orders_per_window: Some(5),
            rate_window_secs: 0,
            ..Default::default()
        };
        assert!(zero_window.validate().is_err());

        let mut observe_validation = RiskLimitsConfig::default();
        observe_validation
            .enforcement
            .insert(RiskCategory::Validation, Enforcement::Observe);
        assert!(observe_validation.validate().is_err());
    }

    #[test]
    fn test_deserialize_toml() {
        let cfg: RiskLimitsConfig = toml::from_str(
            r#"
            max_order_notional = "1000"
            max_daily_loss_abs = "500"
            max_orders_per_window = 10
            block_on_violation = false

            [enforcement]
            total_exposure = "block"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_order_notional, Some(dec!(1000)));
        assert_eq!(cfg.rate_window_secs, 60);
        assert_eq!(
            cfg.enforcement_for(RiskCategory::TotalExposure),
            Enforcement::Block
        );
        assert_eq!(
            cfg.enforcement_for(RiskCategory::SymbolExposure),
            Enforcement::Observe
        );
    }
}
