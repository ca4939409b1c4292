//! Audit trail for ordergate.
//!
//! Every pipeline invocation produces one top-level [`AuditEvent`], carrying
//! each denied order's decision and the risk metrics, plus one execution
//! event per order that reached an executor. Sinks are
//! append-only; a failing sink never changes a decision.

pub mod error;
pub mod event;
pub mod sink;
pub mod writer;

pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditStage, OrderDecision};
pub use sink::{AuditSink, BroadcastAuditSink, DynAuditSink, FanoutAuditSink, MemoryAuditSink};
pub use writer::JsonLinesAuditSink;
