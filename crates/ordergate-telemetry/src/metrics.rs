//! Prometheus metrics for ordergate.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error and aborts at first
//! use rather than silently dropping the series.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Admission decisions.
/// Labels: stage (safety/risk/admitted), code
pub static DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ordergate_decisions_total",
        "Admission decisions by stage and code",
        &["stage", "code"]
    )
    .unwrap()
});

/// Observe-only risk violations that did not block.
pub static OBSERVED_VIOLATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ordergate_observed_violations_total",
        "Risk violations recorded without blocking",
        &["code"]
    )
    .unwrap()
});

/// Executor outcomes.
/// Labels: route (simulated/dry_run_venue/live_venue), outcome (filled/partial/failed)
pub static EXECUTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ordergate_executions_total",
        "Executor outcomes by route",
        &["route", "outcome"]
    )
    .unwrap()
});

/// Executor retries beyond the first attempt.
pub static EXECUTOR_RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ordergate_executor_retries_total",
        "Executor retries beyond the first attempt",
        &["route"]
    )
    .unwrap()
});

/// Audit events a sink failed to record.
pub static AUDIT_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ordergate_audit_failures_total",
        "Audit events a sink failed to record"
    )
    .unwrap()
});

/// End-to-end pipeline latency per batch.
pub static PIPELINE_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "ordergate_pipeline_latency_ms",
        "Pipeline latency per batch in milliseconds",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]
    )
    .unwrap()
});

/// Kill switch state (1 = engaged).
pub static KILL_SWITCH_ENGAGED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ordergate_kill_switch_engaged",
        "Kill switch state (1=engaged)"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a safety or risk denial.
    pub fn denied(stage: &str, code: &str) {
        DECISIONS_TOTAL.with_label_values(&[stage, code]).inc();
    }

    /// Record an order admitted to execution.
    pub fn admitted() {
        DECISIONS_TOTAL.with_label_values(&["admitted", "ok"]).inc();
    }

    pub fn observed_violation(code: &str) {
        OBSERVED_VIOLATIONS_TOTAL.with_label_values(&[code]).inc();
    }

    /// Record an executor outcome and its retries.
    pub fn execution(route: &str, outcome: &str, retries: u32) {
        EXECUTIONS_TOTAL.with_label_values(&[route, outcome]).inc();
        if retries > 0 {
            EXECUTOR_RETRIES_TOTAL
                .with_label_values(&[route])
                .inc_by(u64::from(retries));
        }
    }

    pub fn audit_failure() {
        AUDIT_FAILURES_TOTAL.inc();
    }

    pub fn pipeline_latency(ms: f64) {
        PIPELINE_LATENCY_MS.observe(ms);
    }

    pub fn kill_switch(engaged: bool) {
        KILL_SWITCH_ENGAGED.set(i64::from(engaged));
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        Metrics::denied("risk", "RISK_DAILY_LOSS_BREACH");
        Metrics::execution("live_venue", "filled", 2);
        Metrics::audit_failure();
        Metrics::kill_switch(true);

        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("ordergate_decisions_total"));
        assert!(text.contains("RISK_DAILY_LOSS_BREACH"));
        assert!(text.contains("ordergate_executor_retries_total"));
        assert!(text.contains("ordergate_kill_switch_engaged 1"));
    }

    #[test]
    fn test_retries_accumulate() {
        let before = EXECUTOR_RETRIES_TOTAL
            .with_label_values(&["dry_run_venue"])
            .get();
        Metrics::execution("dry_run_venue", "filled", 3);
        Metrics::execution("dry_run_venue", "filled", 0);
        let after = EXECUTOR_RETRIES_TOTAL
            .with_label_values(&["dry_run_venue"])
            .get();
        assert_eq!(after - before, 3);
    }
}
