//! The per-isolate event loop
//!
//! One loop task runs per isolate. It takes calls off the queue in FIFO
//! order and dispatches them one at a time, so no two handlers of the same
//! isolate ever run concurrently.
//!
//! The loop runs inside a task-local scope carrying the isolate id. An
//! `IsolateHandle` checks that scope to detect callers that are already on
//! the isolate (a handler calling back into its own isolate) and dispatches
//! those calls inline instead of queueing them behind the call that is
//! waiting for them.

use crate::call::{Call, CallReceiver, Reply};
use crate::metrics::HostMetrics;
use crate::router::Router;
use futures::FutureExt;
use isolink_core::{CallRequest, CallResult, Error, Result};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Queued calls the loop runs back to back before polling termination and
/// the queue again
const MAX_BURST: usize = 32;

tokio::task_local! {
    static CURRENT_ISOLATE: u64;
}

/// Id of the isolate whose event loop is running the current task, if any
pub fn current_isolate() -> Option<u64> {
    CURRENT_ISOLATE.try_with(|id| *id).ok()
}

/// What an isolate needs to run a call: its identity, router and metrics
///
/// Shared between the event loop and every handle, so inline dispatch and
/// queued dispatch go through the same path.
pub(crate) struct Dispatcher {
    pub id: u64,
    pub name: String,
    pub router: Router,
    pub metrics: Option<Arc<HostMetrics>>,
}

impl Dispatcher {
    /// Run the handler for `request` and normalize its value
    ///
    /// A panicking handler is reported as `Error::Internal`; the loop
    /// survives it.
    pub async fn invoke(&self, request: &CallRequest) -> Result<CallResult> {
        let start = Instant::now();

        let routed = self
            .router
            .route_for_isolate(&request.method, request.params.clone(), &self.name);

        let result = match AssertUnwindSafe(routed).catch_unwind().await {
            Ok(result) => result.map(CallResult::from_value),
            Err(_) => {
                tracing::error!(isolate = %self.name, method = %request.method, "Handler panicked");
                Err(Error::Internal(format!(
                    "Handler for '{}' panicked",
                    request.method
                )))
            }
        };

        if let Some(ref metrics) = self.metrics {
            let status = if result.is_ok() { "success" } else { "error" };
            metrics.record_call(&request.method, status, start.elapsed().as_secs_f64());
            if let Err(ref e) = result {
                metrics.record_error(e.kind());
            }
        }

        result
    }

    /// Dispatch a dequeued call according to its reply route
    async fn dispatch(&self, call: Call) {
        let Call {
            request,
            reply,
            enqueued_at,
        } = call;

        if let Some(ref metrics) = self.metrics {
            metrics.record_wait(&request.method, enqueued_at.elapsed().as_secs_f64());
        }

        tracing::debug!(
            isolate = %self.name,
            method = %request.method,
            reply = reply.kind(),
            "Dispatching call"
        );

        match reply {
            Reply::Execute(tx) => {
                let result = self.invoke(&request).await;
                if tx.send(result).is_err() {
                    // Caller timed out or went away; the late result is dropped
                    tracing::debug!(
                        isolate = %self.name,
                        method = %request.method,
                        "Discarding result for abandoned call"
                    );
                }
            }
            Reply::Notify => {
                if let Err(e) = self.invoke(&request).await {
                    tracing::warn!(
                        isolate = %self.name,
                        method = %request.method,
                        error = %e,
                        "Notification handler failed"
                    );
                }
            }
            Reply::Callback(callback) => {
                let method = request.method.clone();
                if std::panic::catch_unwind(AssertUnwindSafe(move || callback(request))).is_err() {
                    tracing::error!(isolate = %self.name, method = %method, "Callback panicked");
                }
            }
        }
    }
}

/// The loop task of one isolate
pub(crate) struct EventLoop {
    dispatcher: Arc<Dispatcher>,
    calls: CallReceiver,
    shutdown: watch::Receiver<bool>,
}

impl EventLoop {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        calls: CallReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            dispatcher,
            calls,
            shutdown,
        }
    }

    /// Run until terminated or until every handle is gone
    pub async fn run(self) {
        let id = self.dispatcher.id;
        CURRENT_ISOLATE.scope(id, self.run_scoped()).await
    }

    async fn run_scoped(mut self) {
        tracing::info!(isolate = %self.dispatcher.name, id = self.dispatcher.id, "Event loop started");

        loop {
            // Termination wins over queued work
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                call = self.calls.recv() => match call {
                    Some(call) => {
                        self.record_depth();
                        self.dispatcher.dispatch(call).await;
                        self.drain_burst().await;
                    }
                    None => break,
                },
            }
        }

        let abandoned = self.calls.close_and_drain();
        let count = abandoned.len();
        for call in abandoned {
            if let Reply::Execute(tx) = call.reply {
                let _ = tx.send(Err(Error::IsolateTerminated));
            }
        }
        self.record_depth();

        tracing::info!(
            isolate = %self.dispatcher.name,
            abandoned = count,
            "Event loop stopped"
        );
    }

    /// Run calls that are already queued, up to `MAX_BURST`, stopping early
    /// once termination is requested
    async fn drain_burst(&mut self) -> usize {
        let mut processed = 0;
        while processed < MAX_BURST && !self.terminating() && self.do_one_work().await {
            processed += 1;
        }
        processed
    }

    fn terminating(&self) -> bool {
        self.shutdown.has_changed().is_err() || *self.shutdown.borrow()
    }

    /// Process one queued call without waiting
    ///
    /// Returns whether a call was processed.
    pub async fn do_one_work(&mut self) -> bool {
        let id = self.dispatcher.id;
        let Some(call) = self.calls.try_recv() else {
            return false;
        };
        self.record_depth();
        let dispatcher = Arc::clone(&self.dispatcher);
        CURRENT_ISOLATE
            .scope(id, async move { dispatcher.dispatch(call).await })
            .await;
        true
    }

    fn record_depth(&self) {
        if let Some(ref metrics) = self.dispatcher.metrics {
            let depth = i64::try_from(self.calls.pending()).unwrap_or(i64::MAX);
            metrics.record_queue_depth(&self.dispatcher.name, depth);
        }
    }
}
