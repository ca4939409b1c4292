//! Snapshot provider contract.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ordergate_core::{Fill, PortfolioState};

use crate::error::PositionResult;

/// Source of read-only portfolio snapshots.
///
/// `snapshot` must return a consistent view; the pipeline calls it once at
/// batch start. The notification hooks default to no-ops for providers that
/// learn about submissions and fills from elsewhere.
pub trait PortfolioProvider: Send + Sync {
    fn snapshot(&self) -> PortfolioState;

    /// An order left the pipeline towards an executor at `at`.
    fn on_submitted(&self, _at: DateTime<Utc>) {}

    /// An executor reported a fill.
    fn on_fill(&self, _fill: &Fill) {}
}

/// Arc wrapper for PortfolioProvider trait objects.
pub type DynPortfolioProvider = Arc<dyn PortfolioProvider>;

/// A fixed snapshot is its own provider.
impl PortfolioProvider for PortfolioState {
    fn snapshot(&self) -> PortfolioState {
        self.clone()
    }
}

/// Load a snapshot from a JSON file.
pub fn load_portfolio(path: impl AsRef<Path>) -> PositionResult<PortfolioState> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
