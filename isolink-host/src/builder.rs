//! Isolate builder
//!
//! The builder collects everything an isolate needs before its event loop
//! starts:
//! - Name (used in logs, metrics and middleware context)
//! - Operation handlers
//! - Middleware
//! - Default call timeout
//! - Metrics and observability
//!
//! Handlers can't be added once the loop runs; the router is fixed at
//! `build` time.
//!
//! # Examples
//!
//! ```rust,no_run
//! use isolink_host::{from_sync_fn, Isolate, LoggingMiddleware};
//! use std::time::Duration;
//!
//! # async fn example() -> isolink_core::Result<()> {
//! let isolate = Isolate::builder()
//!     .name("main")
//!     .handler("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))))
//!     .use_sync_middleware(LoggingMiddleware)
//!     .default_timeout(Duration::from_secs(1))
//!     .with_metrics()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::call::call_queue;
use crate::event_loop::{Dispatcher, EventLoop};
use crate::isolate::{Isolate, IsolateHandle};
use crate::{Handler, HostMetrics, Middleware, MiddlewareChain, Router, SyncMiddleware};
use isolink_core::{Error, ObservabilityConfig, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default timeout for `IsolateHandle::execute`
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Builder for an `Isolate`
pub struct IsolateBuilder {
    name: Option<String>,
    router: Router,
    middleware_chain: MiddlewareChain,
    default_timeout: Option<Duration>,
    metrics: Option<Arc<HostMetrics>>,
    enable_metrics: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl IsolateBuilder {
    /// Create a new isolate builder
    pub fn new() -> Self {
        Self {
            name: None,
            router: Router::new(),
            middleware_chain: MiddlewareChain::new(),
            default_timeout: Some(DEFAULT_CALL_TIMEOUT),
            metrics: None,
            enable_metrics: false,
            observability_config: None,
            service_name: None,
        }
    }

    /// Name the isolate (default: `isolate-<id>`)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register a handler; a later registration under the same name wins
    pub fn handler(mut self, method: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        self.router.register(method, handler);
        self
    }

    /// Use a prepared router (replaces any handlers registered so far)
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Timeout used by `IsolateHandle::execute`
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Let `IsolateHandle::execute` wait indefinitely
    pub fn no_default_timeout(mut self) -> Self {
        self.default_timeout = None;
        self
    }

    /// Add middleware
    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware_chain.add(middleware);
        self
    }

    /// Add sync middleware
    pub fn use_sync_middleware<T: SyncMiddleware + 'static>(mut self, middleware: T) -> Self {
        self.middleware_chain.add_sync(middleware);
        self
    }

    /// Record host metrics on the global meter
    ///
    /// Use this when observability was initialized elsewhere in the process.
    pub fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }

    /// Share an existing metrics instance between isolates
    pub fn metrics(mut self, metrics: Arc<HostMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Initialize observability with this configuration during `build`
    ///
    /// Implies `with_metrics`. Observability can only be initialized once per
    /// process; building a second isolate this way fails.
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Service name for observability and metrics
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
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

    /// Spawn the event loop and return the running isolate
    ///
    /// # Errors
    ///
    /// - `Error::Internal` when called outside a tokio runtime
    /// - `Error::Internal` when observability initialization fails
    pub fn build(mut self) -> Result<Isolate> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Internal(format!("Isolate must be built inside a tokio runtime: {}", e))
        })?;

        let service_name = self.resolved_service_name();

        if let Some(mut config) = self.observability_config.take() {
            config.service_name = service_name.clone();
            isolink_core::init_observability(config).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;
            self.enable_metrics = true;
        }

        let metrics = match self.metrics {
            Some(metrics) => Some(metrics),
            None if self.enable_metrics => Some(Arc::new(HostMetrics::new(service_name))),
            None => None,
        };

        if !self.middleware_chain.is_empty() {
            self.router.set_middleware(self.middleware_chain);
        }

        let id = NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed);
        let name = self.name.unwrap_or_else(|| format!("isolate-{}", id));

        let dispatcher = Arc::new(Dispatcher {
            id,
            name,
            router: self.router,
            metrics,
        });

        let (queue, calls) = call_queue();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let event_loop = EventLoop::new(Arc::clone(&dispatcher), calls, shutdown_rx);
        let task = runtime.spawn(event_loop.run());

        tracing::info!(
            isolate = %dispatcher.name,
            id,
            methods = ?dispatcher.router.methods(),
            "Isolate started"
        );

        let handle = IsolateHandle::new(
            dispatcher,
            queue,
            Arc::new(shutdown_tx),
            self.default_timeout,
        );

        Ok(Isolate::from_parts(handle, task))
    }
}

impl Default for IsolateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
