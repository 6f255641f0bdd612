//! Operation routing for an isolate
//!
//! The router maps operation names to handlers and runs the middleware
//! chain around every dispatch. Each isolate owns exactly one router; it is
//! consulted by the event loop for queued calls and directly by callers that
//! are already running on the isolate (see `IsolateHandle::execute`).
//!
//! # Thread Safety
//!
//! Routers are cheaply cloneable (`Arc`-based). Registration goes through
//! `Arc::make_mut`, so a router that has already been handed to an isolate
//! is never mutated behind its back.
//!
//! # Examples
//!
//! ```rust
//! use isolink_host::{Router, from_sync_fn};
//!
//! let mut router = Router::new();
//! router.register("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))));
//!
//! assert!(router.has_method("ping"));
//! ```

use crate::handler::Handler;
use crate::middleware::{MiddlewareChain, MiddlewareContext};
use isolink_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Router for isolate operations
///
/// Registering a second handler under an existing name replaces the first;
/// the last registration wins.
#[derive(Clone)]
pub struct Router {
    handlers: Arc<HashMap<String, Arc<dyn Handler>>>,
    middleware_chain: MiddlewareChain,
}

impl Router {
    /// Create a new empty router
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(HashMap::new()),
            middleware_chain: MiddlewareChain::new(),
        }
    }

    /// Create a router with middleware
    pub fn with_middleware(middleware_chain: MiddlewareChain) -> Self {
        Self {
            handlers: Arc::new(HashMap::new()),
            middleware_chain,
        }
    }

    /// Register a handler for an operation
    ///
    /// Returns `true` if a previously registered handler was replaced.
    pub fn register(&mut self, method: impl Into<String>, handler: Box<dyn Handler>) -> bool {
        let method = method.into();
        let handlers = Arc::make_mut(&mut self.handlers);
        let replaced = handlers.insert(method.clone(), Arc::from(handler)).is_some();
        if replaced {
            tracing::warn!(method = %method, "Handler replaced");
        } else {
            tracing::debug!(method = %method, "Handler registered");
        }
        replaced
    }

    /// Set the middleware chain for this router
    pub fn set_middleware(&mut self, middleware_chain: MiddlewareChain) {
        self.middleware_chain = middleware_chain;
    }

    /// Mutable access to the middleware chain
    pub fn middleware_mut(&mut self) -> &mut MiddlewareChain {
        &mut self.middleware_chain
    }

    /// Get the handler for an operation
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    /// Check if an operation is registered
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// All registered operation names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Route a call to its handler
    pub async fn route(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.route_for_isolate(method, params, "").await
    }

    /// Route a call, naming the isolate for middleware
    ///
    /// # Errors
    ///
    /// `Error::MethodNotFound` when nothing is registered under `method`;
    /// otherwise whatever the middleware or handler returns.
    pub async fn route_for_isolate(
        &self,
        method: &str,
        params: Option<Value>,
        isolate: &str,
    ) -> Result<Value> {
        let handler = self
            .get(method)
            .ok_or_else(|| Error::MethodNotFound(method.to_string()))?;

        if self.middleware_chain.is_empty() {
            return handler.handle(params).await;
        }

        let ctx = MiddlewareContext::new(method.to_string(), params, isolate.to_string());

        self.middleware_chain
            .execute(ctx, |ctx| async move { handler.handle(ctx.params).await })
            .await
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing a router
pub struct RouterBuilder {
    router: Router,
}

impl RouterBuilder {
    /// Create a new router builder
    pub fn new() -> Self {
        Self {
            router: Router::new(),
        }
    }

    /// Create a router builder with middleware
    pub fn with_middleware(middleware_chain: MiddlewareChain) -> Self {
        Self {
            router: Router::with_middleware(middleware_chain),
        }
    }

    /// Add a handler for an operation
    pub fn handler(mut self, method: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        self.router.register(method, handler);
        self
    }

    /// Build the router
    pub fn build(self) -> Router {
        self.router
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
