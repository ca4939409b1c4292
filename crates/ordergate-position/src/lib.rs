//! Portfolio state provider for ordergate.
//!
//! The pipeline reads one `PortfolioState` snapshot per batch and never
//! mutates it. Bookkeeping belongs to the provider:
//!
//! - [`PortfolioProvider`]: snapshot source, plus optional notifications of
//!   submissions and fills
//! - [`SharedPortfolio`]: in-process single-writer, multi-reader ledger
//! - [`load_portfolio`]: read a snapshot from a JSON file

pub mod error;
pub mod provider;
pub mod shared;

pub use error::{PositionError, PositionResult};
pub use provider::{load_portfolio, DynPortfolioProvider, PortfolioProvider};
pub use shared::SharedPortfolio;
