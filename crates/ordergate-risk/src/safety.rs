//! Operating-mode safety gate.
//!
//! Rules run in a fixed order and the first violated rule wins, so the
//! reason reported for a given environment never changes between runs:
//!
//! 1. Paper: only simulated routing.
//! 2. Testnet: simulated or dry-run venue routing; live routing is denied.
//! 3. Live: trading enabled, then armed, then confirm token. When every
//!    check passes but `live_dry_run` is set, the order is force-routed to
//!    a simulated fill and the clearance is marked as downgraded.
//!
//! The gate is pure: no I/O, no clock, no interior state.

use std::fmt;

use ordergate_core::{EnvironmentState, OrderRequest, Routing, SafetyViolation, TradingMode};
use serde::Serialize;
use tracing::{debug, trace};

/// Successful safety evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyClearance {
    /// Route the order must take.
    pub route: Routing,
    /// The requested route was replaced by a simulated fill.
    pub downgraded: bool,
}

impl SafetyClearance {
    fn as_requested(route: Routing) -> Self {
        Self {
            route,
            downgraded: false,
        }
    }
}

/// Decides whether an order may leave the process under the current mode.
pub trait SafetyGate: Send + Sync {
    /// `intent` is the route the configured executor would use.
    fn evaluate(
        &self,
        env: &EnvironmentState,
        order: &OrderRequest,
        intent: Routing,
    ) -> Result<SafetyClearance, SafetyViolation>;
}

/// Default `SafetyGate`.
///
/// Holds the expected confirm token. A gate built without one denies every
/// Live order that requires a token.
#[derive(Clone, Default)]
pub struct ModeSafetyGate {
    expected_token: Option<String>,
}

impl fmt::Debug for ModeSafetyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeSafetyGate")
            .field("expected_token", &self.expected_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ModeSafetyGate {
    #[must_use]
    pub fn new(expected_token: Option<String>) -> Self {
        Self { expected_token }
    }

    fn check_live(&self, env: &EnvironmentState) -> Result<(), SafetyViolation> {
        if !env.live_trading_enabled {
            return Err(SafetyViolation::LiveTradingDisabled);
        }
        if !env.live_mode_armed {
            return Err(SafetyViolation::LiveNotArmed);
        }
        if !env.confirm_token_matches(self.expected_token.as_deref()) {
            return Err(SafetyViolation::ConfirmTokenInvalid);
        }
        Ok(())
    }
}

impl SafetyGate for ModeSafetyGate {
    fn evaluate(
        &self,
        env: &EnvironmentState,
        order: &OrderRequest,
        intent: Routing,
    ) -> Result<SafetyClearance, SafetyViolation> {
        let verdict = match env.mode {
            TradingMode::Paper => match intent {
                Routing::Simulated => Ok(SafetyClearance::as_requested(intent)),
                _ => Err(SafetyViolation::PaperNonSimulated { intent }),
            },
            TradingMode::Testnet => match intent {
                Routing::LiveVenue => Err(SafetyViolation::TestnetLiveRouting),
                _ => Ok(SafetyClearance::as_requested(intent)),
            },
            // Live checks apply to every intent, simulated included.
            TradingMode::Live => self.check_live(env).map(|()| {
                if env.live_dry_run {
                    SafetyClearance {
                        route: Routing::Simulated,
                        downgraded: intent != Routing::Simulated,
                    }
                } else {
                    SafetyClearance::as_requested(intent)
                }
            }),
        };

        match &verdict {
            Ok(clearance) => trace!(
                symbol = %order.symbol,
                mode = env.mode_label(),
                intent = %intent,
                route = %clearance.route,
                downgraded = clearance.downgraded,
                "Safety gate passed"
            ),
            Err(violation) => debug!(
                symbol = %order.symbol,
                mode = env.mode_label(),
                intent = %intent,
                code = violation.code(),
                reason = %violation,
                "Safety gate denied"
            ),
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordergate_core::{OrderSide, Size};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const TOKEN: &str = "i-understand-real-money";

    fn order() -> OrderRequest {
        OrderRequest::market("BTC-USD", OrderSide::Buy, Size::new(dec!(1)))
    }

    fn gate() -> ModeSafetyGate {
        ModeSafetyGate::new(Some(TOKEN.to_string()))
    }

    #[test]
    fn test_paper_allows_simulated_only() {
        let env = EnvironmentState::paper();
        let ok = gate().evaluate(&env, &order(), Routing::Simulated).unwrap();
        assert_eq!(ok.route, Routing::Simulated);
        assert!(!ok.downgraded);

        for intent in [Routing::DryRunVenue, Routing::LiveVenue] {
            let err = gate().evaluate(&env, &order(), intent).unwrap_err();
            assert_eq!(err.code(), "SAFETY_PAPER_NON_SIMULATED");
        }
    }

    #[test]
    fn test_testnet_is_dry_run_only() {
        let env = EnvironmentState::testnet();
        assert!(gate().evaluate(&env, &order(), Routing::DryRunVenue).is_ok());
        assert!(gate().evaluate(&env, &order(), Routing::Simulated).is_ok());
        let err = gate().evaluate(&env, &order(), Routing::LiveVenue).unwrap_err();
        assert_eq!(err, SafetyViolation::TestnetLiveRouting);
        assert_eq!(err.reason(), "testnet is dry-run only");
    }

    #[test]
    fn test_live_rule_order() {
        let env = EnvironmentState {
            live_trading_enabled: false,
            live_mode_armed: false,
            confirm_token: None,
            ..EnvironmentState::live_armed(TOKEN)
        };
        let err = gate().evaluate(&env, &order(), Routing::LiveVenue).unwrap_err();
        assert_eq!(err, SafetyViolation::LiveTradingDisabled);

        let env = EnvironmentState {
            live_mode_armed: false,
            confirm_token: None,
            ..EnvironmentState::live_armed(TOKEN)
        };
        let err = gate().evaluate(&env, &order(), Routing::LiveVenue).unwrap_err();
        assert_eq!(err.code(), "LIVE_NOT_ARMED");

        let env = EnvironmentState {
            confirm_token: Some("wrong".to_string()),
            ..EnvironmentState::live_armed(TOKEN)
        };
        let err = gate().evaluate(&env, &order(), Routing::LiveVenue).unwrap_err();
        assert_eq!(err.code(), "LIVE_CONFIRM_TOKEN_INVALID");
    }

    #[test]
    fn test_live_checks_apply_to_simulated_intent() {
        let env = EnvironmentState {
            live_mode_armed: false,
            ..EnvironmentState::live_armed(TOKEN)
        };
        let err = gate().evaluate(&env, &order(), Routing::Simulated).unwrap_err();
        assert_eq!(err, SafetyViolation::LiveNotArmed);
    }

    #[test]
    fn test_live_happy_path_routes_to_venue() {
        let env = EnvironmentState::live_armed(TOKEN);
        let ok = gate().evaluate(&env, &order(), Routing::LiveVenue).unwrap();
        assert_eq!(ok.route, Routing::LiveVenue);
        assert!(!ok.downgraded);
    }

    #[test]
    fn test_live_dry_run_downgrades() {
        let env = EnvironmentState {
            live_dry_run: true,
            ..EnvironmentState::live_armed(TOKEN)
        };
        let ok = gate().evaluate(&env, &order(), Routing::LiveVenue).unwrap();
        assert_eq!(ok.route, Routing::Simulated);
        assert!(ok.downgraded);
        assert_eq!(env.mode_label(), "live_dry_run");
    }

    #[test]
    fn test_gate_without_expected_token_denies_live() {
        let env = EnvironmentState::live_armed(TOKEN);
        let err = ModeSafetyGate::default()
            .evaluate(&env, &order(), Routing::LiveVenue)
            .unwrap_err();
        assert_eq!(err, SafetyViolation::ConfirmTokenInvalid);
    }

    #[test]
    fn test_debug_redacts_expected_token() {
        assert!(!format!("{:?}", gate()).contains(TOKEN));
    }

    proptest! {
        /// Over every combination of the live flags, a LiveVenue route comes
        /// back only when all of them line up.
        #[test]
        fn prop_live_venue_only_when_fully_open(
            enabled in any::<bool>(),
            armed in any::<bool>(),
            dry_run in any::<bool>(),
            token_ok in any::<bool>(),
            require_token in any::<bool>(),
        ) {
            let env = EnvironmentState {
                live_trading_enabled: enabled,
                live_mode_armed: armed,
                live_dry_run: dry_run,
                require_confirm_token: require_token,
                confirm_token: token_ok.then(|| TOKEN.to_string()),
                ..EnvironmentState::live_armed(TOKEN)
            };
            let reached_live = matches!(
                gate().evaluate(&env, &order(), Routing::LiveVenue),
                Ok(SafetyClearance { route: Routing::LiveVenue, .. })
            );
            let fully_open = enabled && armed && !dry_run && (token_ok || !require_token);
            prop_assert_eq!(reached_live, fully_open);
            prop_assert_eq!(reached_live, env.real_venue_reachable(Some(TOKEN)));
        }
    }
}
