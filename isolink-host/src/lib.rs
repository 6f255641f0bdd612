//! Isolate host: event loops, handler routing and the native call manager
//!
//! An isolate is a named execution context that owns a set of operation
//! handlers and processes calls one at a time on its own event loop.
//! Native code reaches it through an `IsolateHandle`, which queues calls
//! and waits for their result objects.
//!
//! # Core Features
//!
//! - **Handler registration**: map operation names to async or sync handlers
//! - **FIFO event loop**: one task per isolate, one call at a time
//! - **Call manager**: execute with timeout, JSON text calls, notifications,
//!   native callbacks, backlog inspection
//! - **Re-entrancy**: a handler calling back into its own isolate is
//!   dispatched inline instead of deadlocking on the queue
//! - **Middleware**: interceptors around every handler invocation
//! - **Scheduler**: injected one-shot timers
//! - **Observability**: `tracing` events and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use isolink_core::CallRequest;
//! use isolink_host::{from_sync_fn, Isolate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let isolate = Isolate::builder()
//!         .name("main")
//!         .handler("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))))
//!         .build()?;
//!
//!     let pong = isolate.handle().execute(CallRequest::new("ping")).await?;
//!     println!("{}", pong);
//!
//!     isolate.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Event loop task**: owns the receiving end of the call queue and the
//!   router; dispatches in arrival order
//! - **Handles**: cheap clones holding the sending end; any task may call
//! - **Replies**: each executed call carries a oneshot back to its caller,
//!   which waits with a tokio timeout
//!
//! Termination is signalled through a watch channel, so a call in flight
//! finishes while everything still queued is failed with
//! `Error::IsolateTerminated`.

mod builder;
mod call;
mod event_loop;
mod handler;
mod isolate;
mod metrics;
mod middleware;
mod router;
mod scheduler;

pub use builder::{IsolateBuilder, DEFAULT_CALL_TIMEOUT};
pub use event_loop::current_isolate;
pub use handler::{from_fn, from_sync_fn, from_typed_fn, AsyncHandler, Handler, HandlerResult};
pub use isolate::{Isolate, IsolateHandle};
pub use metrics::HostMetrics;
pub use middleware::{
    CountingMiddleware, LoggingMiddleware, Middleware, MiddlewareAction, MiddlewareChain,
    MiddlewareContext, SyncMiddleware, TracingMiddleware,
};
pub use router::{Router, RouterBuilder};
pub use scheduler::{Scheduler, TimerHandle};
