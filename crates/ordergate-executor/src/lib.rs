//! Order executors for ordergate.
//!
//! Three interchangeable backends share the `OrderExecutor` contract:
//! - `SimulatedExecutor`: deterministic fill from a supplied price, no network
//! - `DryRunVenueExecutor`: read-only venue validation, synthetic fill
//! - `LiveVenueExecutor`: the only backend that can produce a real fill
//!
//! Venue access goes through the `VenueClient` trait (`HttpVenueClient` for
//! REST, `ScriptedVenue` for tests). Retry with bounded exponential backoff
//! lives here, not in the pipeline.

pub mod dry_run;
pub mod error;
pub mod executor;
pub mod http_venue;
pub mod live;
pub mod retry;
pub mod simulated;
pub mod venue;

pub use dry_run::DryRunVenueExecutor;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{BoxFuture, DynOrderExecutor, OrderExecutor, OrderTracker};
pub use http_venue::HttpVenueClient;
pub use live::LiveVenueExecutor;
pub use retry::RetryPolicy;
pub use simulated::{MarkPriceCache, SimulatedExecutor};
pub use venue::{
    DynVenueClient, ScriptedReply, ScriptedVenue, SymbolRules, VenueAck, VenueClient, VenueOrder,
};
