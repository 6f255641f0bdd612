//! One-shot timers
//!
//! A `Scheduler` is passed explicitly to code that needs delayed work, so
//! tests can hand in their own runtime and nothing relies on a global timer
//! facility.
//!
//! ```rust
//! use isolink_host::Scheduler;
//! use std::time::Duration;
//!
//! # async fn example() -> isolink_core::Result<()> {
//! let scheduler = Scheduler::current()?;
//! let timer = scheduler.set_timeout(Duration::from_millis(100), || {
//!     tracing::info!("Timer fired");
//! });
//! assert!(!timer.is_fired());
//! # Ok(())
//! # }
//! ```

use isolink_core::{Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Milliseconds of `duration` for log fields, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs closures after a delay on a tokio runtime
#[derive(Clone, Debug)]
pub struct Scheduler {
    runtime: Handle,
}

impl Scheduler {
    /// Scheduler on an explicit runtime
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Scheduler on the runtime of the calling task
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::Internal(format!("No tokio runtime for scheduler: {}", e)))
    }

    /// Run `f` once after `delay`
    ///
    /// Dropping the returned handle leaves the timer armed.
    pub fn set_timeout<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(ARMED));
        let timer_state = Arc::clone(&state);

        tracing::trace!(delay_ms = millis(delay), "Timer set");

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Loses against a concurrent cancel
            if timer_state
                .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                f();
            }
        });

        TimerHandle { task, state }
    }
}

/// Handle to a pending timer
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
    state: Arc<AtomicU8>,
}

impl TimerHandle {
    /// Cancel the timer
    ///
    /// Returns `true` only if this call stopped the closure from running;
    /// `false` if it already fired or was already cancelled.
    pub fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.task.abort();
        tracing::trace!("Timer cancelled");
        true
    }

    /// Whether the closure has started running
    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Instant;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_timer_fires_after_delay() {
        let scheduler = Scheduler::current().unwrap();
        let (tx, rx) = oneshot::channel();

        let start = Instant::now();
        let timer = scheduler.set_timeout(Duration::from_millis(50), move || {
            let _ = tx.send(());
        });

        rx.await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(timer.is_fired());
        assert!(!timer.cancel());
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let scheduler = Scheduler::current().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let timer = scheduler.set_timeout(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(!timer.is_fired());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_result_matches_whether_closure_ran() {
        let scheduler = Scheduler::current().unwrap();

        for round in 0..50 {
            let runs = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&runs);
            let timer = scheduler.set_timeout(Duration::ZERO, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            if round % 2 == 0 {
                tokio::task::yield_now().await;
            }

            let cancelled = timer.cancel();
            tokio::time::sleep(Duration::from_millis(5)).await;

            let expected = if cancelled { 0 } else { 1 };
            assert_eq!(runs.load(Ordering::SeqCst), expected, "round {}", round);
            assert_eq!(timer.is_fired(), !cancelled);
        }
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(42)), 42);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_dropped_handle_keeps_timer() {
        let scheduler = Scheduler::current().unwrap();
        let (tx, rx) = oneshot::channel();

        drop(scheduler.set_timeout(Duration::from_millis(10), move || {
            let _ = tx.send(());
        }));

        assert!(rx.await.is_ok());
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(Scheduler::current().is_err());
    }
}
