//! Shared environment and operator kill switch.
//!
//! `SharedEnvironment` hands out `Arc<EnvironmentState>` snapshots. A
//! pipeline run reads one snapshot at batch start and keeps it for the whole
//! run, so a reload or a kill switch is observed by the next run and never
//! mid-batch.
//!
//! The kill switch is a latch: once engaged, `live_trading_enabled` stays
//! false across reloads until an operator resets it. Engaging never touches
//! orders that are already past the safety gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ordergate_core::EnvironmentState;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info, warn};

/// Record of a kill switch engagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillSwitchEvent {
    pub reason: String,
    pub engaged_at: DateTime<Utc>,
}

/// Environment holder shared by every pipeline in the process.
///
/// Thread-safe: share via `Arc<SharedEnvironment>`.
pub struct SharedEnvironment {
    current: RwLock<Arc<EnvironmentState>>,
    latched: AtomicBool,
    event: RwLock<Option<KillSwitchEvent>>,
}

impl SharedEnvironment {
    #[must_use]
    pub fn new(initial: EnvironmentState) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            latched: AtomicBool::new(false),
            event: RwLock::new(None),
        }
    }

    /// Consistent view for one pipeline run.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EnvironmentState> {
        Arc::clone(&self.current.read())
    }

    /// Replace the environment atomically.
    ///
    /// While the kill switch is latched the new state is applied with
    /// `live_trading_enabled` forced off.
    pub fn reload(&self, mut next: EnvironmentState) {
        let mut guard = self.current.write();
        if self.latched.load(Ordering::SeqCst) && next.live_trading_enabled {
            warn!("Kill switch latched, reload cannot re-enable live trading");
            next.live_trading_enabled = false;
        }
        info!(
            mode = next.mode_label(),
            live_trading_enabled = next.live_trading_enabled,
            live_mode_armed = next.live_mode_armed,
            "Environment reloaded"
        );
        *guard = Arc::new(next);
    }

    /// Stop placement of new orders.
    ///
    /// Returns false when the switch was already engaged; the original
    /// reason is kept.
    pub fn engage_kill_switch(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let first = self
            .latched
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        {
            let mut guard = self.current.write();
            if guard.live_trading_enabled {
                let mut next = EnvironmentState::clone(&guard);
                next.live_trading_enabled = false;
                *guard = Arc::new(next);
            }
        }

        if first {
            *self.event.write() = Some(KillSwitchEvent {
                reason: reason.clone(),
                engaged_at: Utc::now(),
            });
            error!(reason = %reason, "KILL SWITCH ENGAGED");
        } else {
            warn!(new_reason = %reason, "Kill switch already engaged, ignoring");
        }
        first
    }

    #[must_use]
    pub fn is_kill_switch_engaged(&self) -> bool {
        self.latched.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn kill_switch_event(&self) -> Option<KillSwitchEvent> {
        self.event.read().clone()
    }

    /// Manual reset. Live trading stays disabled until a reload turns it
    /// back on.
    pub fn reset_kill_switch(&self) {
        if self.latched.swap(false, Ordering::SeqCst) {
            let previous = self.event.write().take();
            info!(previous = ?previous, "Kill switch manually reset");
        }
    }
}

impl Default for SharedEnvironment {
    fn default() -> Self {
        Self::new(EnvironmentState::default())
    }
}
