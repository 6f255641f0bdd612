//! Tester builder
//!
//! Configures the suite a `RpcTester` runs:
//! - Checks (default: `ping` returns pong)
//! - Iterations of the whole suite
//! - Per-call timeout
//! - Metrics and observability
//!
//! # Examples
//!
//! ```rust,no_run
//! use isolink_core::CallRequest;
//! use isolink_tester::{ExpectError, ExpectResult, RpcTester};
//! use std::time::Duration;
//!
//! # fn example(isolate: isolink_host::IsolateHandle) -> isolink_core::Result<()> {
//! let tester = RpcTester::builder(isolate)
//!     .check(ExpectResult::ping())
//!     .check(ExpectError::new("unknown", CallRequest::new("nope"), -32601))
//!     .iterations(3)
//!     .call_timeout(Duration::from_millis(250))
//!     .with_metrics()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::check::{Check, ExpectResult};
use crate::metrics::TesterMetrics;
use crate::tester::RpcTester;
use isolink_core::{Error, ObservabilityConfig, Result};
use isolink_host::IsolateHandle;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on each call a check makes
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Builder for `RpcTester`
pub struct TesterBuilder {
    isolate: IsolateHandle,
    checks: Vec<Arc<dyn Check>>,
    iterations: u32,
    call_timeout: Duration,
    enable_metrics: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl TesterBuilder {
    /// Create a builder for testing `isolate`
    pub fn new(isolate: IsolateHandle) -> Self {
        Self {
            isolate,
            checks: Vec::new(),
            iterations: 1,
            call_timeout: DEFAULT_CHECK_TIMEOUT,
            enable_metrics: false,
            observability_config: None,
            service_name: None,
        }
    }

    /// Add a check; checks run in the order they were added
    pub fn check<C: Check + 'static>(mut self, check: C) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Add a shared check
    pub fn check_arc(mut self, check: Arc<dyn Check>) -> Self {
        self.checks.push(check);
        self
    }

    /// Run the whole suite `n` times (at least once)
    pub fn iterations(mut self, n: u32) -> Self {
        if n == 0 {
            tracing::warn!("Iterations must be at least 1, using 1");
        }
        self.iterations = n.max(1);
        self
    }

    /// Bound each call a check makes
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Record tester metrics on the global meter
    pub fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }

    /// Initialize observability during `build`; implies `with_metrics`
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Service name for observability and metrics
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the tester
    ///
    /// # Errors
    ///
    /// `Error::Internal` when observability initialization fails.
    pub fn build(mut self) -> Result<RpcTester> {
        let service_name = self.resolved_service_name();
        if let Some(mut config) = self.observability_config.take() {
            config.service_name = service_name.clone();
            self.service_name = Some(service_name);
            isolink_core::init_observability(config).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;
            self.enable_metrics = true;
        }

        Ok(self.build_unobserved())
    }

    /// The explicit service name, else the observability config's, else
    /// "isolink"
    fn resolved_service_name(&self) -> String {
        self.service_name
            .clone()
            .or_else(|| {
                self.observability_config
                    .as_ref()
                    .map(|config| config.service_name.clone())
            })
            .unwrap_or_else(|| "isolink".to_string())
    }

    pub(crate) fn build_unobserved(self) -> RpcTester {
        let metrics = self
            .enable_metrics
            .then(|| Arc::new(TesterMetrics::new(self.resolved_service_name())));

        let checks = if self.checks.is_empty() {
            vec![Arc::new(ExpectResult::ping()) as Arc<dyn Check>]
        } else {
            self.checks
        };

        RpcTester::from_parts(
            self.isolate,
            checks,
            self.iterations,
            self.call_timeout,
            metrics,
        )
    }
}
