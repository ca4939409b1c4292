//! Application configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ordergate_core::{EnvironmentState, Routing, TradingMode};
use ordergate_executor::RetryPolicy;
use ordergate_risk::RiskLimitsConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "ORDERGATE_CONFIG";
/// Environment variable overriding `executor.api_key`.
pub const API_KEY_ENV: &str = "ORDERGATE_VENUE_API_KEY";
/// Environment variable overriding `environment.confirm_token`.
pub const CONFIRM_TOKEN_ENV: &str = "ORDERGATE_CONFIRM_TOKEN";
/// Environment variable overriding `safety.expected_confirm_token`.
pub const EXPECTED_TOKEN_ENV: &str = "ORDERGATE_EXPECTED_CONFIRM_TOKEN";

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ============================================================================
// Sections
// ============================================================================

/// Expected live confirmation held by the safety gate.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default, skip_serializing)]
    pub expected_confirm_token: Option<String>,
}

impl fmt::Debug for SafetyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyConfig")
            .field(
                "expected_confirm_token",
                &self.expected_confirm_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Executor backend selection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub route: Routing,
    /// Base URL of the venue REST API; required for venue routes.
    #[serde(default)]
    pub venue_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// HTTP client timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            route: Routing::Simulated,
            venue_url: None,
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("route", &self.route)
            .field("venue_url", &self.venue_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Audit trail destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Directory for daily JSON Lines files; none disables file output.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Buffer of the tailable broadcast stream; zero disables it.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: None,
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "warn,ordergate=info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Complete configuration of one ordergate session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: EnvironmentState,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub risk: RiskLimitsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Config path: explicit flag, then `ORDERGATE_CONFIG`, then the default.
    pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load from a specific file. Secrets from the environment are applied.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply secret overrides. Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(key) = get(API_KEY_ENV) {
            self.executor.api_key = Some(key);
        }
        if let Some(token) = get(CONFIRM_TOKEN_ENV) {
            self.environment.confirm_token = Some(token);
        }
        if let Some(token) = get(EXPECTED_TOKEN_ENV) {
            self.safety.expected_confirm_token = Some(token);
        }
    }

    /// Reject configurations that must never reach the pipeline builder.
    pub fn validate(&self) -> AppResult<()> {
        self.risk.validate()?;
        self.executor
            .retry
            .validate()
            .map_err(|e| AppError::Config(format!("executor.retry: {e}")))?;

        if self.executor.route != Routing::Simulated {
            match self.executor.venue_url.as_deref() {
                Some(url) if !url.trim().is_empty() => {}
                _ => {
                    return Err(AppError::Config(format!(
                        "executor.venue_url is required for route {}",
                        self.executor.route
                    )))
                }
            }
        }
        if self.executor.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "executor.request_timeout_ms must be positive".to_string(),
            ));
        }

        let expected_missing = self
            .safety
            .expected_confirm_token
            .as_deref()
            .map_or(true, str::is_empty);
        if self.environment.mode == TradingMode::Live
            && self.environment.require_confirm_token
            && expected_missing
        {
            return Err(AppError::Config(
                "live mode requires safety.expected_confirm_token".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordergate_risk::{Enforcement, RiskCategory};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[environment]
mode = "testnet"

[risk]
max_order_notional = "1000"
max_daily_loss_abs = "500"
max_orders_per_window = 10
rate_window_secs = 60
block_on_violation = false

[risk.enforcement]
daily_loss = "block"
order_notional = "observe"

[executor]
route = "dry_run_venue"
venue_url = "https://venue.example"

[executor.retry]
max_attempts = 4
call_timeout_ms = 2000

[audit]
dir = "data/audit"
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.environment.mode, TradingMode::Testnet);
        assert!(config.environment.live_dry_run);
        assert_eq!(config.risk.max_order_notional, Some(dec!(1000)));
        assert_eq!(
            config.risk.enforcement_for(RiskCategory::OrderNotional),
            Enforcement::Observe
        );
        assert_eq!(config.executor.route, Routing::DryRunVenue);
        assert_eq!(config.executor.retry.max_attempts, 4);
        assert_eq!(config.executor.retry.initial_backoff_ms, 100);
        assert_eq!(config.audit.dir, Some(PathBuf::from("data/audit")));
        assert_eq!(config.telemetry.log_filter, "warn,ordergate=info");
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_is_paper_simulated() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.environment.mode, TradingMode::Paper);
        assert_eq!(config.executor.route, Routing::Simulated);
        config.validate().unwrap();
    }

    #[test]
    fn test_venue_route_requires_url() {
        let config = AppConfig::from_toml("[executor]\nroute = \"live_venue\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("venue_url"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = AppConfig::from_toml("[executor.retry]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let config = AppConfig::from_toml("[risk]\nmax_order_notional = \"-1\"\n").unwrap();
        assert!(matches!(config.validate(), Err(AppError::Risk(_))));
    }

    #[test]
    fn test_live_requires_expected_token() {
        let mut config = AppConfig::from_toml("[environment]\nmode = \"live\"\n").unwrap();
        assert!(config.validate().is_err());

        config.safety.expected_confirm_token = Some("secret".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (API_KEY_ENV, "key-1"),
            (CONFIRM_TOKEN_ENV, "tok"),
            (EXPECTED_TOKEN_ENV, ""),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.executor.api_key.as_deref(), Some("key-1"));
        assert_eq!(config.environment.confirm_token.as_deref(), Some("tok"));
        assert!(config.safety.expected_confirm_token.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.executor.api_key = Some("super-secret".to_string());
        config.safety.expected_confirm_token = Some("also-secret".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.executor.route, Routing::DryRunVenue);
        assert!(AppConfig::from_file("/nonexistent/ordergate.toml").is_err());
    }

    #[test]
    fn test_resolve_path_prefers_flag() {
        let path = AppConfig::resolve_path(Some(PathBuf::from("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }
}
