//! Safety-gated execution pipeline.
//!
//! `OrderRequest`s flow through `SafetyGate`, then `RiskAdmissionControl`,
//! then an `OrderExecutor`, and every batch ends with audit events. A denial
//! at either decision stage never reaches an executor.

pub mod builder;
pub mod error;
pub mod pipeline;
pub mod trace;

pub use builder::PipelineBuilder;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{execute_with_safety, ExecutionPipeline, Stages};
pub use trace::StateTrace;
