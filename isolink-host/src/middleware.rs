//! Middleware around handler dispatch
//!
//! Middleware runs inside the isolate, around every handler invocation the
//! router performs. Each middleware can:
//! - Inspect or rewrite the params before the handler runs
//! - Short-circuit and answer without calling the handler
//! - Observe the handler's result afterwards
//! - Leave metadata for middleware further down the chain
//!
//! `pre_handle` runs in registration order, `post_handle` in reverse.
//!
//! # Built-in Middleware
//!
//! - **LoggingMiddleware**: structured `tracing` events per call
//! - **TracingMiddleware**: one span per call, closed with the outcome
//! - **CountingMiddleware**: call and failure counters for tests and health checks
//!
//! # Examples
//!
//! ```rust
//! use isolink_host::{MiddlewareChain, LoggingMiddleware};
//!
//! let mut chain = MiddlewareChain::new();
//! chain.add_sync(LoggingMiddleware);
//! assert_eq!(chain.len(), 1);
//! ```

use async_trait::async_trait;
use isolink_core::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Action to take after middleware pre-processing
#[derive(Debug, Clone)]
pub enum MiddlewareAction {
    /// Continue to next middleware/handler
    Continue,
    /// Skip the handler and return this value
    ShortCircuit(Value),
}

/// What middleware sees about the call being dispatched
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    /// Operation name
    pub method: String,
    /// Payload handed to the handler
    pub params: Option<Value>,
    /// Name of the isolate running the call (empty when routed directly)
    pub isolate: String,
    /// Scratch space shared along the chain
    pub metadata: HashMap<String, Value>,
}

impl MiddlewareContext {
    /// Create a new middleware context
    pub fn new(method: String, params: Option<Value>, isolate: String) -> Self {
        Self {
            method,
            params,
            isolate,
            metadata: HashMap::new(),
        }
    }

    /// Insert metadata that can be accessed by subsequent middleware
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Get metadata by key
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Async middleware
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Called before the handler
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction>;

    /// Called after the handler with its result
    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Value>) -> Result<()>;
}

/// Middleware that does no async work
pub trait SyncMiddleware: Send + Sync {
    /// Called before the handler
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction>;

    /// Called after the handler with its result
    fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Value>) -> Result<()>;
}

struct SyncMiddlewareAdapter<T: SyncMiddleware> {
    inner: T,
}

#[async_trait]
impl<T: SyncMiddleware + 'static> Middleware for SyncMiddlewareAdapter<T> {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        self.inner.pre_handle(ctx)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Value>) -> Result<()> {
        self.inner.post_handle(ctx, result)
    }
}

/// Ordered list of middleware
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Append a middleware
    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Append a sync middleware
    pub fn add_sync<T: SyncMiddleware + 'static>(&mut self, middleware: T) {
        self.middlewares
            .push(Arc::new(SyncMiddlewareAdapter { inner: middleware }));
    }

    /// Run the chain around `handler`
    ///
    /// An error from any `pre_handle` aborts the call with that error. A
    /// short-circuit skips the handler and every `post_handle`. Errors from
    /// `post_handle` are logged and do not change the result.
    pub async fn execute<F, Fut>(&self, mut ctx: MiddlewareContext, handler: F) -> Result<Value>
    where
        F: FnOnce(MiddlewareContext) -> Fut + Send,
        Fut: std::future::Future<Output = Result<Value>> + Send,
    {
        for middleware in &self.middlewares {
            match middleware.pre_handle(&mut ctx).await? {
                MiddlewareAction::Continue => continue,
                MiddlewareAction::ShortCircuit(value) => return Ok(value),
            }
        }

        let result = handler(ctx.clone()).await;

        for middleware in self.middlewares.iter().rev() {
            if let Err(e) = middleware.post_handle(&mut ctx, &result).await {
                tracing::warn!(method = %ctx.method, error = %e, "post_handle failed");
            }
        }

        result
    }

    /// Number of middleware in the chain
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Logs every call at debug level and every failure at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl SyncMiddleware for LoggingMiddleware {
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        tracing::debug!(
            method = %ctx.method,
            isolate = %ctx.isolate,
            has_params = ctx.params.is_some(),
            "Call dispatched"
        );
        Ok(MiddlewareAction::Continue)
    }

    fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Value>) -> Result<()> {
        match result {
            Ok(value) => tracing::debug!(
                method = %ctx.method,
                isolate = %ctx.isolate,
                result = %value.to_string().chars().take(100).collect::<String>(),
                "Call completed"
            ),
            Err(e) => tracing::warn!(
                method = %ctx.method,
                isolate = %ctx.isolate,
                error = %e,
                "Call failed"
            ),
        }
        Ok(())
    }
}

/// Counts calls and failures
///
/// Share it with `Arc` to read the counters while the isolate runs.
#[derive(Debug, Default)]
pub struct CountingMiddleware {
    calls: AtomicU64,
    failures: AtomicU64,
}

impl CountingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls that reached this middleware
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls whose handler returned an error
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Middleware for CountingMiddleware {
    async fn pre_handle(&self, _ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(&self, _ctx: &mut MiddlewareContext, result: &Result<Value>) -> Result<()> {
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

const STARTED_AT_KEY: &str = "tracing.started_at_us";

/// Emits one `isolate_call` span per call
///
/// The span is opened in `pre_handle` to mark the start and re-opened in
/// `post_handle` with the elapsed time and outcome. The start instant is
/// kept as microseconds relative to the middleware's creation.
pub struct TracingMiddleware {
    epoch: Instant,
}

impl TracingMiddleware {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        let span = tracing::info_span!("isolate_call", method = %ctx.method, isolate = %ctx.isolate);
        let _enter = span.enter();
        tracing::debug!("Call started");

        ctx.insert_metadata(STARTED_AT_KEY, Value::from(self.now_us()));
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &Result<Value>) -> Result<()> {
        let elapsed_us = ctx
            .get_metadata(STARTED_AT_KEY)
            .and_then(Value::as_u64)
            .map(|start| self.now_us().saturating_sub(start));

        let span = tracing::info_span!("isolate_call", method = %ctx.method, isolate = %ctx.isolate);
        let _enter = span.enter();

        match result {
            Ok(_) => tracing::info!(elapsed_us = ?elapsed_us, "Call completed"),
            Err(e) => tracing::error!(elapsed_us = ?elapsed_us, error = %e, code = e.code(), "Call failed"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isolink_core::Error;

    struct TagMiddleware {
        name: String,
    }

    impl TagMiddleware {
        fn new(name: impl Into<String>) -> Self {
            Self { name: name.into() }
        }
    }

    impl SyncMiddleware for TagMiddleware {
        fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
            ctx.insert_metadata(format!("{}_pre", self.name), Value::Bool(true));
            Ok(MiddlewareAction::Continue)
        }

        fn post_handle(&self, ctx: &mut MiddlewareContext, _result: &Result<Value>) -> Result<()> {
            ctx.insert_metadata(format!("{}_post", self.name), Value::Bool(true));
            Ok(())
        }
    }

    struct ShortCircuitMiddleware;

    impl SyncMiddleware for ShortCircuitMiddleware {
        fn pre_handle(&self, _ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
            Ok(MiddlewareAction::ShortCircuit(Value::String("cached".to_string())))
        }

        fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Value>) -> Result<()> {
            Ok(())
        }
    }

    struct RejectMiddleware;

    impl SyncMiddleware for RejectMiddleware {
        fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
            Err(Error::InvalidParams(format!("{} rejected", ctx.method)))
        }

        fn post_handle(&self, _ctx: &mut MiddlewareContext, _result: &Result<Value>) -> Result<()> {
            Ok(())
        }
    }

    fn ctx(method: &str) -> MiddlewareContext {
        MiddlewareContext::new(method.to_string(), None, "test-isolate".to_string())
    }

    #[tokio::test]
    async fn test_pre_handle_runs_in_order_before_handler() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(TagMiddleware::new("first"));
        chain.add_sync(TagMiddleware::new("second"));

        let result = chain
            .execute(ctx("ping"), |ctx| async move {
                assert!(ctx.get_metadata("first_pre").is_some());
                assert!(ctx.get_metadata("second_pre").is_some());
                assert_eq!(ctx.isolate, "test-isolate");
                Ok(Value::String("pong".to_string()))
            })
            .await;

        assert_eq!(result.unwrap(), Value::String("pong".to_string()));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(TagMiddleware::new("first"));
        chain.add_sync(ShortCircuitMiddleware);
        chain.add_sync(TagMiddleware::new("third"));

        let result = chain
            .execute(ctx("ping"), |_ctx| async move {
                panic!("handler must not run");
            })
            .await;

        assert_eq!(result.unwrap(), Value::String("cached".to_string()));
    }

    #[tokio::test]
    async fn test_pre_handle_error_aborts_call() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(RejectMiddleware);

        let result = chain
            .execute(ctx("ping"), |_ctx| async move { Ok(Value::Null) })
            .await;

        assert!(matches!(result, Err(Error::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let mut chain = MiddlewareChain::new();
        chain.add_sync(LoggingMiddleware::new());

        let result = chain
            .execute(ctx("ping"), |_ctx| async move {
                Err(Error::Internal("boom".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_counting_middleware() {
        let counter = Arc::new(CountingMiddleware::new());
        let mut chain = MiddlewareChain::new();
        chain.add(counter.clone());

        chain
            .execute(ctx("ping"), |_ctx| async move { Ok(Value::Null) })
            .await
            .unwrap();
        let _ = chain
            .execute(ctx("ping"), |_ctx| async move { Err(Error::Timeout) })
            .await;

        assert_eq!(counter.calls(), 2);
        assert_eq!(counter.failures(), 1);
    }

    #[tokio::test]
    async fn test_tracing_middleware_records_start() {
        let middleware = TracingMiddleware::new();
        let mut ctx = ctx("ping");

        let action = middleware.pre_handle(&mut ctx).await.unwrap();
        assert!(matches!(action, MiddlewareAction::Continue));
        assert!(ctx.get_metadata(STARTED_AT_KEY).is_some());

        let result = Ok(Value::String("pong".to_string()));
        middleware.post_handle(&mut ctx, &result).await.unwrap();
    }
}
