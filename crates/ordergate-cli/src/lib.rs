//! Operator surface for the ordergate pipeline.
//!
//! - TOML configuration loading and validation
//! - Pipeline construction from a validated config
//! - Preview runs that force the simulated executor

pub mod app;
pub mod config;
pub mod error;

pub use app::{load_orders, load_portfolio_or_default, Application};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
