//! Operating mode and the live multi-flag gate.
//!
//! An `EnvironmentState` is created once per session from validated
//! configuration. Reloads produce a new instance that is swapped in between
//! pipeline runs, so a single run always observes one consistent value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Testnet,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Testnet => "testnet",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an admitted order is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    #[default]
    Simulated,
    DryRunVenue,
    LiveVenue,
}

impl Routing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::DryRunVenue => "dry_run_venue",
            Self::LiveVenue => "live_venue",
        }
    }

    /// Only `LiveVenue` can produce a real fill.
    pub fn is_real(&self) -> bool {
        matches!(self, Self::LiveVenue)
    }
}

impl fmt::Display for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating mode plus the live-specific flags.
///
/// Real-venue execution requires every flag to line up:
/// `mode == Live && live_trading_enabled && live_mode_armed && !live_dry_run`
/// and, when `require_confirm_token` is set, a token matching the expected one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentState {
    #[serde(default)]
    pub mode: TradingMode,
    #[serde(default)]
    pub live_trading_enabled: bool,
    #[serde(default)]
    pub live_mode_armed: bool,
    #[serde(default = "default_true")]
    pub live_dry_run: bool,
    #[serde(default = "default_true")]
    pub require_confirm_token: bool,
    /// Operator-supplied confirmation. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub confirm_token: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self::paper()
    }
}

impl fmt::Debug for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentState")
            .field("mode", &self.mode)
            .field("live_trading_enabled", &self.live_trading_enabled)
            .field("live_mode_armed", &self.live_mode_armed)
            .field("live_dry_run", &self.live_dry_run)
            .field("require_confirm_token", &self.require_confirm_token)
            .field(
                "confirm_token",
                &self.confirm_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl EnvironmentState {
    pub fn paper() -> Self {
        Self {
            mode: TradingMode::Paper,
            live_trading_enabled: false,
            live_mode_armed: false,
            live_dry_run: true,
            require_confirm_token: true,
            confirm_token: None,
        }
    }

    pub fn testnet() -> Self {
        Self {
            mode: TradingMode::Testnet,
            ..Self::paper()
        }
    }

    /// Live with every flag set for real placement.
    pub fn live_armed(token: impl Into<String>) -> Self {
        Self {
            mode: TradingMode::Live,
            live_trading_enabled: true,
            live_mode_armed: true,
            live_dry_run: false,
            require_confirm_token: true,
            confirm_token: Some(token.into()),
        }
    }

    /// Token check in isolation.
    ///
    /// When a token is required, both sides must be present and non-empty;
    /// an unconfigured expected token never matches.
    pub fn confirm_token_matches(&self, expected: Option<&str>) -> bool {
        if !self.require_confirm_token {
            return true;
        }
        match (self.confirm_token.as_deref(), expected) {
            (Some(given), Some(expected)) => !expected.is_empty() && given == expected,
            _ => false,
        }
    }

    /// Whether a real venue fill is reachable under this state.
    pub fn real_venue_reachable(&self, expected_token: Option<&str>) -> bool {
        self.mode == TradingMode::Live
            && self.live_trading_enabled
            && self.live_mode_armed
            && !self.live_dry_run
            && self.confirm_token_matches(expected_token)
    }

    /// Label recorded in audit events and results.
    ///
    /// Live with `live_dry_run` set is reported separately so a downgrade is
    /// visible in the trail.
    pub fn mode_label(&self) -> &'static str {
        match self.mode {
            TradingMode::Live if self.live_dry_run => "live_dry_run",
            mode => mode.as_str(),
        }
    }
}
