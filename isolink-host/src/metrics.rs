//! Isolate host metrics
//!
//! OpenTelemetry instruments recorded by the event loop. They are only
//! created when an isolate is built with `with_metrics` or
//! `with_observability`; without a meter provider installed they are no-ops.
//!
//! # Metrics Collected
//!
//! - **isolink.host.calls.total**: calls dispatched, by method and status (counter)
//! - **isolink.host.call.duration**: handler time in seconds, by method and status (histogram)
//! - **isolink.host.call.wait**: time a call spent queued before dispatch (histogram)
//! - **isolink.host.queue.depth**: calls waiting in the queue (gauge)
//! - **isolink.host.errors.total**: failed calls, by error kind (counter)
//!
//! # Examples
//!
//! ```rust
//! use isolink_host::HostMetrics;
//!
//! let metrics = HostMetrics::new("ping-pong");
//! metrics.record_call("ping", "success", 0.0004);
//! metrics.record_queue_depth("main", 0);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Metrics for one or more isolates
///
/// Every record method takes the attributes it needs; one instance can be
/// shared by several isolates.
pub struct HostMetrics {
    /// Calls dispatched
    pub calls_total: Counter<u64>,
    /// Handler duration in seconds
    pub call_duration: Histogram<f64>,
    /// Queue wait in seconds
    pub call_wait: Histogram<f64>,
    /// Calls waiting to be dispatched
    pub queue_depth: Gauge<i64>,
    /// Failed calls
    pub errors_total: Counter<u64>,
}

impl HostMetrics {
    /// Create metrics on the global meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        // The global meter needs a 'static name; metrics live for the process
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            calls_total: meter
                .u64_counter("isolink.host.calls.total")
                .with_description("Total number of calls dispatched by isolates")
                .build(),
            call_duration: meter
                .f64_histogram("isolink.host.call.duration")
                .with_description("Handler execution time in seconds")
                .build(),
            call_wait: meter
                .f64_histogram("isolink.host.call.wait")
                .with_description("Time calls spent queued before dispatch in seconds")
                .build(),
            queue_depth: meter
                .i64_gauge("isolink.host.queue.depth")
                .with_description("Number of calls waiting in an isolate queue")
                .build(),
            errors_total: meter
                .u64_counter("isolink.host.errors.total")
                .with_description("Total number of failed calls")
                .build(),
        }
    }

    /// Record a finished call
    pub fn record_call(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration.record(duration_secs, attributes);
    }

    /// Record how long a call waited in the queue
    pub fn record_wait(&self, method: &str, wait_secs: f64) {
        self.call_wait
            .record(wait_secs, &[KeyValue::new("method", method.to_string())]);
    }

    /// Record the current queue depth of an isolate
    pub fn record_queue_depth(&self, isolate: &str, depth: i64) {
        self.queue_depth
            .record(depth, &[KeyValue::new("isolate", isolate.to_string())]);
    }

    /// Record a failed call
    pub fn record_error(&self, error_kind: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_kind.to_string())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = HostMetrics::new("test-host");

        metrics.record_call("ping", "success", 0.001);
        metrics.record_wait("ping", 0.0001);
        metrics.record_queue_depth("main", 3);
        metrics.record_error("timeout");
    }

    #[test]
    fn test_metrics_shared_across_isolates() {
        let metrics = HostMetrics::new("test-host-shared");

        metrics.record_queue_depth("a", 1);
        metrics.record_queue_depth("b", 0);
        metrics.record_call("ping", "error", 0.02);
        metrics.record_error("method_not_found");
    }
}
