//! Audit sink contract and in-process sinks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{AuditError, AuditResult};
use crate::event::AuditEvent;

/// Append-only destination for audit events.
///
/// Implementations never rewrite or drop earlier events. Callers treat an
/// `Err` as best-effort loss of this one event.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> AuditResult<()>;
}

/// Arc wrapper for AuditSink trait objects.
pub type DynAuditSink = Arc<dyn AuditSink>;

// ============================================================================
// MemoryAuditSink
// ============================================================================

/// Keeps every event in memory. Used by the preview CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn for_batch(&self, batch_id: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> AuditResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// BroadcastAuditSink
// ============================================================================

/// Tailable stream for external monitors.
///
/// Events published with no subscriber attached are not an error. A slow
/// subscriber sees `RecvError::Lagged` rather than blocking the pipeline.
#[derive(Debug, Clone)]
pub struct BroadcastAuditSink {
    tx: broadcast::Sender<AuditEvent>,
}

impl BroadcastAuditSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl AuditSink for BroadcastAuditSink {
    fn record(&self, event: &AuditEvent) -> AuditResult<()> {
        match self.tx.send(event.clone()) {
            Ok(receivers) => trace!(receivers, "Audit event published"),
            Err(_) => trace!("Audit event published with no subscribers"),
        }
        Ok(())
    }
}

// ============================================================================
// FanoutAuditSink
// ============================================================================

/// Writes to every inner sink; one failing sink does not starve the others.
#[derive(Default)]
pub struct FanoutAuditSink {
    sinks: Vec<DynAuditSink>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<DynAuditSink>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: DynAuditSink) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: &AuditEvent) -> AuditResult<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AuditError::Unavailable(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordergate_core::TerminalState;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _event: &AuditEvent) -> AuditResult<()> {
            Err(AuditError::Unavailable("disk full".to_string()))
        }
    }

    fn event(batch: &str) -> AuditEvent {
        AuditEvent::pipeline(batch, "paper", "1 order".to_string(), TerminalState::Executed)
    }

    #[test]
    fn test_memory_sink_appends() {
        let sink = MemoryAuditSink::new();
        sink.record(&event("a")).unwrap();
        sink.record(&event("b")).unwrap();
        sink.record(&event("a")).unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.for_batch("a").len(), 2);
        assert_eq!(sink.events()[1].batch_id, "b");
    }

    #[tokio::test]
    async fn test_broadcast_sink_tails_events() {
        let sink = BroadcastAuditSink::new(8);
        let mut rx = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 1);

        sink.record(&event("a")).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.batch_id, "a");
    }

    #[test]
    fn test_broadcast_sink_without_subscribers_is_ok() {
        let sink = BroadcastAuditSink::new(8);
        assert!(sink.record(&event("a")).is_ok());
    }

    #[test]
    fn test_fanout_continues_past_failure() {
        let memory = Arc::new(MemoryAuditSink::new());
        let fanout = FanoutAuditSink::new(vec![Arc::new(BrokenSink), memory.clone()]);

        let result = fanout.record(&event("a"));
        assert!(matches!(result, Err(AuditError::Unavailable(msg)) if msg.contains("disk full")));
        assert_eq!(memory.len(), 1);
    }
}
