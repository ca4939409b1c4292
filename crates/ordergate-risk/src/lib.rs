//! Admission control for ordergate.
//!
//! Two pure decision stages run before any executor is touched:
//! - `SafetyGate`: operating-mode routing rules and the live multi-flag gate
//! - `RiskAdmissionControl`: per-order and portfolio-level limits, daily-loss
//!   circuit breaker, sliding-window rate limit
//!
//! Also provides:
//! - `RiskLimitsConfig`: limits plus per-category enforcement switches
//! - `SharedEnvironment`: atomic environment reloads and the operator kill switch

pub mod admission;
pub mod error;
pub mod kill_switch;
pub mod limits;
pub mod safety;

pub use admission::{LimitsRiskControl, RiskAdmissionControl};
pub use error::{RiskError, RiskResult};
pub use kill_switch::{KillSwitchEvent, SharedEnvironment};
pub use limits::{Enforcement, RiskLimitsConfig};
pub use safety::{ModeSafetyGate, SafetyClearance, SafetyGate};

pub use ordergate_core::{
    OrderRiskResult, RiskCategory, RiskCheckResult, RiskCode, RiskMetrics, RiskViolation,
    SafetyViolation,
};
