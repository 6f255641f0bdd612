//! Handler traits and constructors for isolate operations
//!
//! A handler is what an isolate runs when a call for its operation name is
//! dequeued. Handlers are:
//!
//! - **Async-compatible**: they return a pinned, boxed future
//! - **Thread-safe**: `Send + Sync`, so the router can be shared with callers
//!   that dispatch inline
//! - **Type-erased**: they work with `serde_json::Value` so one router can
//!   hold handlers of every shape
//!
//! # Creating Handlers
//!
//! 1. **from_fn**: wrap an async closure over the raw JSON params
//! 2. **from_typed_fn**: wrap an async closure with automatic (de)serialization
//! 3. **from_sync_fn**: wrap a plain closure that does no async work
//!
//! # Examples
//!
//! ```rust
//! use isolink_host::{from_fn, from_sync_fn};
//!
//! let ping = from_sync_fn(|_params| Ok(serde_json::json!({"result": "pong"})));
//!
//! let echo = from_fn(|params| async move {
//!     Ok(params.unwrap_or_default())
//! });
//! ```

use isolink_core::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Future returned by every handler
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Trait for isolate operation handlers
///
/// The returned value is normalized into a `CallResult` by the host: objects
/// are used as-is, any other value is wrapped under `result`.
///
/// You typically don't implement this trait directly; use `from_fn`,
/// `from_typed_fn` or `from_sync_fn`.
pub trait Handler: Send + Sync {
    /// Handle one call
    ///
    /// `params` is `None` when the request carried no payload.
    fn handle(&self, params: Option<Value>) -> HandlerResult;
}

/// Adapter from an async closure to `Handler`
pub struct AsyncHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    func: F,
}

impl<F, Fut> AsyncHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    /// Wrap `func`
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for AsyncHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, params: Option<Value>) -> HandlerResult {
        Box::pin((self.func)(params))
    }
}

/// Create a handler from an async function over raw JSON values
pub fn from_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Box::new(AsyncHandler::new(func))
}

/// Create a handler from a synchronous function
///
/// The function runs on the isolate's event loop when the call is
/// dispatched; keep it short, nothing else on that isolate runs meanwhile.
///
/// ```rust
/// use isolink_host::from_sync_fn;
///
/// let handler = from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"})));
/// ```
pub fn from_sync_fn<F>(func: F) -> Box<dyn Handler>
where
    F: Fn(Option<Value>) -> Result<Value> + Send + Sync + 'static,
{
    from_fn(move |params| std::future::ready(func(params)))
}

/// Create a handler with automatic type conversion
///
/// - Params that can't be deserialized into `P` → `Error::InvalidParams`
/// - A result that can't be serialized → `Error::Serialization`
/// - Errors from `func` pass through unchanged
///
/// Missing params are deserialized from `null`, which works for `()` and
/// `Option<_>` parameter types.
///
/// ```rust
/// use isolink_host::from_typed_fn;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct AddParams { a: i32, b: i32 }
///
/// let handler = from_typed_fn(|p: AddParams| async move { Ok(p.a + p.b) });
/// ```
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: serde::de::DeserializeOwned + Send + 'static,
    R: serde::Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    use std::sync::Arc;
    // Closures aren't Clone; share one copy across invocations
    let func = Arc::new(func);

    from_fn(move |params: Option<Value>| {
        let func = Arc::clone(&func);
        async move {
            let params: P = serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(|e| Error::InvalidParams(e.to_string()))?;

            let result = func(params).await?;

            serde_json::to_value(result).map_err(|e| Error::Serialization(e.to_string()))
        }
    })
}
