//! Queued calls and their reply routes
//!
//! Every call placed into an isolate carries the request and a description
//! of where its outcome goes:
//!
//! - `Reply::Execute`: a oneshot back to a waiting caller
//! - `Reply::Notify`: nowhere; the handler runs and its result is dropped
//! - `Reply::Callback`: the request is handed to a native callback instead
//!   of a handler
//!
//! The `CallQueue` is the sending half of an isolate's FIFO. It tracks how
//! many calls are waiting so callers can inspect backlog without touching
//! the event loop.

use isolink_core::{CallRequest, CallResult, Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Native callback run in place of a handler
pub type Callback = Box<dyn FnOnce(CallRequest) + Send + 'static>;

/// Where the outcome of a call goes
pub enum Reply {
    /// Deliver the outcome to a waiting caller
    Execute(oneshot::Sender<Result<CallResult>>),
    /// Run the handler, discard the outcome
    Notify,
    /// Skip the handler, give the request to the callback
    Callback(Callback),
}

impl Reply {
    /// Label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Execute(_) => "execute",
            Reply::Notify => "notify",
            Reply::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A call waiting in an isolate's queue
#[derive(Debug)]
pub struct Call {
    pub request: CallRequest,
    pub reply: Reply,
    pub enqueued_at: Instant,
}

impl Call {
    /// A call whose caller waits on the returned receiver
    pub fn execute(request: CallRequest) -> (Self, oneshot::Receiver<Result<CallResult>>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(request, Reply::Execute(tx)), rx)
    }

    /// A fire-and-forget call
    pub fn notify(request: CallRequest) -> Self {
        Self::new(request, Reply::Notify)
    }

    /// A call answered by `callback` instead of a handler
    pub fn callback(request: CallRequest, callback: Callback) -> Self {
        Self::new(request, Reply::Callback(callback))
    }

    fn new(request: CallRequest, reply: Reply) -> Self {
        Self {
            request,
            reply,
            enqueued_at: Instant::now(),
        }
    }
}

/// Sending half of an isolate's call queue
///
/// Cloning shares the queue and its pending counter.
#[derive(Clone)]
pub struct CallQueue {
    tx: mpsc::UnboundedSender<Call>,
    pending: Arc<AtomicUsize>,
}

/// Receiving half, owned by the event loop
pub struct CallReceiver {
    rx: mpsc::UnboundedReceiver<Call>,
    pending: Arc<AtomicUsize>,
}

/// Create a connected queue pair
pub fn call_queue() -> (CallQueue, CallReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        CallQueue {
            tx,
            pending: Arc::clone(&pending),
        },
        CallReceiver { rx, pending },
    )
}

impl CallQueue {
    /// Append a call
    ///
    /// Fails with `Error::IsolateTerminated` once the event loop has stopped
    /// receiving.
    pub fn push(&self, call: Call) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(call).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::IsolateTerminated);
        }
        Ok(())
    }

    /// Calls enqueued but not yet taken by the event loop
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl CallReceiver {
    /// Wait for the next call; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Call> {
        let call = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(call)
    }

    /// Take the next call if one is already queued
    pub fn try_recv(&mut self) -> Option<Call> {
        let call = self.rx.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(call)
    }

    /// Stop accepting calls and hand back whatever is still queued
    pub fn close_and_drain(&mut self) -> Vec<Call> {
        self.rx.close();
        let mut drained = Vec::new();
        while let Ok(call) = self.rx.try_recv() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            drained.push(call);
        }
        drained
    }

    /// Calls still waiting
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
