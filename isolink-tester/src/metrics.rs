//! Tester metrics
//!
//! Recorded when the tester is built with `with_metrics` or
//! `with_observability`.
//!
//! - **isolink.tester.checks.total**: checks executed, by check and status (counter)
//! - **isolink.tester.check.duration**: check wall time in seconds (histogram)
//! - **isolink.tester.runs.total**: completed runs, by status (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Tester metrics
pub struct TesterMetrics {
    /// Checks executed
    pub checks_total: Counter<u64>,
    /// Check wall time in seconds
    pub check_duration: Histogram<f64>,
    /// Completed runs
    pub runs_total: Counter<u64>,
}

impl TesterMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            checks_total: meter
                .u64_counter("isolink.tester.checks.total")
                .with_description("Total number of checks executed")
                .build(),
            check_duration: meter
                .f64_histogram("isolink.tester.check.duration")
                .with_description("Check duration in seconds")
                .build(),
            runs_total: meter
                .u64_counter("isolink.tester.runs.total")
                .with_description("Total number of completed test runs")
                .build(),
        }
    }

    /// Record one check execution
    pub fn record_check(&self, check: &str, passed: bool, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("check", check.to_string()),
            KeyValue::new("status", if passed { "pass" } else { "fail" }),
        ];
        self.checks_total.add(1, attributes);
        self.check_duration.record(duration_secs, attributes);
    }

    /// Record a completed run
    pub fn record_run(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.runs_total.add(1, &[KeyValue::new("status", status)]);
    }
}
