//! Isolates and the handles native code uses to call into them
//!
//! An `Isolate` is a named execution context with its own router and a
//! single event loop task. Native code never touches the loop directly; it
//! goes through an `IsolateHandle`:
//!
//! - `execute`: queue a call and wait for its result object
//! - `execute_json`: the same, from and to JSON text
//! - `notify`: queue a call and don't wait
//! - `notify_with_callback`: queue a native callback that receives the request
//!
//! # Lifecycle
//!
//! `IsolateBuilder::build` spawns the loop. `terminate` stops it: calls
//! still queued and every later call fail with `Error::IsolateTerminated`.
//! Dropping the `Isolate` terminates it too; handles stay valid but only
//! report termination.
//!
//! # Examples
//!
//! ```rust
//! use isolink_core::CallRequest;
//! use isolink_host::{from_sync_fn, Isolate};
//!
//! # async fn example() -> isolink_core::Result<()> {
//! let isolate = Isolate::builder()
//!     .name("main")
//!     .handler("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))))
//!     .build()?;
//!
//! let result = isolate.handle().execute(CallRequest::new("ping")).await?;
//! assert_eq!(result.get_str("result"), Some("pong"));
//!
//! isolate.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::builder::IsolateBuilder;
use crate::call::{Call, CallQueue};
use crate::event_loop::{current_isolate, Dispatcher};
use crate::scheduler::millis;
use isolink_core::{codec, CallRequest, CallResult, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cloneable handle to a running isolate
#[derive(Clone)]
pub struct IsolateHandle {
    dispatcher: Arc<Dispatcher>,
    queue: CallQueue,
    shutdown: Arc<watch::Sender<bool>>,
    default_timeout: Option<Duration>,
}

impl IsolateHandle {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        queue: CallQueue,
        shutdown: Arc<watch::Sender<bool>>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            dispatcher,
            queue,
            shutdown,
            default_timeout,
        }
    }

    /// Process-unique isolate id
    pub fn id(&self) -> u64 {
        self.dispatcher.id
    }

    /// Isolate name
    pub fn name(&self) -> &str {
        &self.dispatcher.name
    }

    /// Registered operation names, sorted
    pub fn methods(&self) -> Vec<String> {
        self.dispatcher.router.methods()
    }

    /// Timeout applied by `execute` (`None` waits indefinitely)
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Number of calls queued and not yet taken by the event loop
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Whether termination was requested or the loop is gone
    pub fn is_terminated(&self) -> bool {
        *self.shutdown.borrow() || self.queue.is_closed()
    }

    /// Whether the current task is this isolate's event loop
    pub fn is_current(&self) -> bool {
        current_isolate() == Some(self.dispatcher.id)
    }

    /// Execute a call and wait for its result, using the default timeout
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` when the default timeout passes first
    /// - `Error::IsolateTerminated` when the isolate stops before answering
    /// - `Error::MethodNotFound` and handler errors as produced by the isolate
    pub async fn execute(&self, request: CallRequest) -> Result<CallResult> {
        match self.default_timeout {
            Some(timeout) => self.execute_with_timeout(request, timeout).await,
            None => self.call(request).await,
        }
    }

    /// Execute a call and wait at most `timeout` for its result
    ///
    /// On timeout the call stays queued; when the isolate reaches it, the
    /// handler runs and its result is discarded.
    #[tracing::instrument(skip(self, request), fields(isolate = %self.name(), method = %request.method))]
    pub async fn execute_with_timeout(
        &self,
        request: CallRequest,
        timeout: Duration,
    ) -> Result<CallResult> {
        match tokio::time::timeout(timeout, self.call(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = millis(timeout), "Call timed out");
                if let Some(ref metrics) = self.dispatcher.metrics {
                    metrics.record_error(Error::Timeout.kind());
                }
                Err(Error::Timeout)
            }
        }
    }

    /// Execute a call given and answered as JSON text
    ///
    /// `timeout` of `None` falls back to the handle's default timeout.
    ///
    /// ```rust
    /// # use isolink_host::{from_sync_fn, Isolate};
    /// # async fn example() -> isolink_core::Result<()> {
    /// # let isolate = Isolate::builder()
    /// #     .handler("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))))
    /// #     .build()?;
    /// let text = isolate.handle().execute_json(r#"{"method":"ping"}"#, None).await?;
    /// assert_eq!(text, r#"{"result":"pong"}"#);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_json(&self, text: &str, timeout: Option<Duration>) -> Result<String> {
        let request = codec::decode_request(text)?;
        let result = match timeout.or(self.default_timeout) {
            Some(timeout) => self.execute_with_timeout(request, timeout).await?,
            None => self.call(request).await?,
        };
        codec::encode_result(&result)
    }

    /// Queue a call without waiting for it
    ///
    /// The handler runs after everything already queued, even when called
    /// from the isolate itself. Handler failures are logged by the isolate.
    pub fn notify(&self, request: CallRequest) -> Result<()> {
        tracing::debug!(isolate = %self.name(), method = %request.method, "Queueing notification");
        self.push(Call::notify(request))
    }

    /// Queue a native callback that receives `request` on the isolate
    ///
    /// No handler runs for this call; the callback is invoked with the
    /// request once the isolate dequeues it.
    pub fn notify_with_callback<F>(&self, request: CallRequest, callback: F) -> Result<()>
    where
        F: FnOnce(CallRequest) + Send + 'static,
    {
        tracing::debug!(isolate = %self.name(), method = %request.method, "Queueing callback");
        self.push(Call::callback(request, Box::new(callback)))
    }

    /// Ask the event loop to stop
    ///
    /// Returns immediately; queued calls fail with `Error::IsolateTerminated`
    /// once the loop notices.
    pub fn terminate(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!(isolate = %self.name(), pending = self.pending(), "Terminating isolate");
        }
    }

    async fn call(&self, request: CallRequest) -> Result<CallResult> {
        // Already on this isolate: queueing would wait on ourselves
        if self.is_current() {
            tracing::debug!(isolate = %self.name(), method = %request.method, "Dispatching inline");
            return self.dispatcher.invoke(&request).await;
        }

        let (call, reply) = Call::execute(request);
        self.push(call)?;
        reply.await.unwrap_or(Err(Error::IsolateTerminated))
    }

    fn push(&self, call: Call) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(Error::IsolateTerminated);
        }
        self.queue.push(call)
    }
}

impl std::fmt::Debug for IsolateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolateHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("pending", &self.pending())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// A running isolate
///
/// Owns the event loop task. Dropping it terminates the loop.
pub struct Isolate {
    handle: IsolateHandle,
    task: Option<JoinHandle<()>>,
}

impl Isolate {
    /// Start configuring a new isolate
    pub fn builder() -> IsolateBuilder {
        IsolateBuilder::new()
    }

    pub(crate) fn from_parts(handle: IsolateHandle, task: JoinHandle<()>) -> Self {
        Self {
            handle,
            task: Some(task),
        }
    }

    /// A new handle to this isolate
    pub fn handle(&self) -> IsolateHandle {
        self.handle.clone()
    }

    /// Isolate name
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Stop the event loop; see `IsolateHandle::terminate`
    pub fn terminate(&self) {
        self.handle.terminate();
    }

    /// Wait for the event loop to exit
    ///
    /// The loop only exits after `terminate` (here or on any handle).
    pub async fn join(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| Error::Internal(format!("Event loop task failed: {}", e))),
            None => Ok(()),
        }
    }

    /// Terminate and wait for the loop to exit
    pub async fn shutdown(self) -> Result<()> {
        self.terminate();
        self.join().await
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.handle.terminate();
    }
}
