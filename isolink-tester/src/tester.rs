//! The native tester
//!
//! `RpcTester` runs a suite of checks against one isolate. Starting a test
//! never blocks and never fails from the caller's point of view: the suite
//! runs on its own task and the caller gets a `TestRun` whose `wait`
//! resolves to the `TestReport` once everything has run.
//!
//! Check failures, including panics inside a check, end up in the report;
//! they never abort the run.
//!
//! # Examples
//!
//! ```rust,no_run
//! use isolink_host::{from_sync_fn, Isolate};
//! use isolink_tester::RpcTester;
//!
//! # async fn example() -> isolink_core::Result<()> {
//! let isolate = Isolate::builder()
//!     .handler("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))))
//!     .build()?;
//!
//! let run = RpcTester::new(isolate.handle()).start_test();
//! let report = run.wait().await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

use crate::builder::TesterBuilder;
use crate::check::Check;
use crate::metrics::TesterMetrics;
use crate::report::{CheckOutcome, TestReport};
use futures::FutureExt;
use isolink_core::{Error, ErrorData, Result};
use isolink_host::IsolateHandle;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Runs checks against an isolate
#[derive(Clone)]
pub struct RpcTester {
    isolate: IsolateHandle,
    checks: Arc<Vec<Arc<dyn Check>>>,
    iterations: u32,
    call_timeout: Duration,
    metrics: Option<Arc<TesterMetrics>>,
}

impl RpcTester {
    /// Tester with the default suite (`ping` returns pong)
    pub fn new(isolate: IsolateHandle) -> Self {
        TesterBuilder::new(isolate).build_unobserved()
    }

    /// Start configuring a tester
    pub fn builder(isolate: IsolateHandle) -> TesterBuilder {
        TesterBuilder::new(isolate)
    }

    pub(crate) fn from_parts(
        isolate: IsolateHandle,
        checks: Vec<Arc<dyn Check>>,
        iterations: u32,
        call_timeout: Duration,
        metrics: Option<Arc<TesterMetrics>>,
    ) -> Self {
        Self {
            isolate,
            checks: Arc::new(checks),
            iterations,
            call_timeout,
            metrics,
        }
    }

    /// Names of the checks in the suite, in run order
    pub fn check_names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name().to_string()).collect()
    }

    /// Start the suite on a new task and return immediately
    ///
    /// Outside a tokio runtime nothing runs and the returned `TestRun`
    /// reports `Error::Internal` from `wait`.
    pub fn start_test(&self) -> TestRun {
        let (tx, rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let tester = self.clone();
                let done = Arc::clone(&finished);
                runtime.spawn(async move {
                    let report = tester.run().await;
                    let _ = tx.send(report);
                    done.store(true, Ordering::SeqCst);
                });
                tracing::info!(
                    isolate = %self.isolate.name(),
                    checks = self.checks.len(),
                    iterations = self.iterations,
                    "Test started"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot start test outside a tokio runtime");
                finished.store(true, Ordering::SeqCst);
            }
        }

        TestRun {
            receiver: Some(rx),
            report: None,
            finished,
        }
    }

    /// Run the suite on the current task and return its report
    #[tracing::instrument(skip(self), fields(isolate = %self.isolate.name()))]
    pub async fn run(&self) -> TestReport {
        let start = Instant::now();
        let mut outcomes = Vec::new();

        for iteration in 0..self.iterations {
            for check in self.checks.iter() {
                outcomes.push(self.run_check(check.as_ref(), iteration).await);
            }
        }

        let report = TestReport {
            isolate: self.isolate.name().to_string(),
            outcomes,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_run(report.is_success());
        }

        if report.is_success() {
            tracing::info!(passed = report.passed(), elapsed_ms = report.elapsed_ms, "Test finished");
        } else {
            tracing::warn!(
                passed = report.passed(),
                failed = report.failed(),
                elapsed_ms = report.elapsed_ms,
                "Test finished with failures"
            );
        }

        report
    }

    async fn run_check(&self, check: &dyn Check, iteration: u32) -> CheckOutcome {
        let start = Instant::now();
        let outcome = AssertUnwindSafe(check.run(&self.isolate, self.call_timeout))
            .catch_unwind()
            .await;
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        let outcome = match outcome {
            Ok(Ok(())) => {
                tracing::debug!(check = check.name(), iteration, "Check passed");
                CheckOutcome::pass(check.name(), iteration, elapsed_ms)
            }
            Ok(Err(e)) => {
                tracing::warn!(check = check.name(), iteration, error = %e, "Check failed");
                CheckOutcome::fail(check.name(), iteration, elapsed_ms, ErrorData::from(&e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(check = check.name(), iteration, panic = %message, "Check panicked");
                CheckOutcome::fail(
                    check.name(),
                    iteration,
                    elapsed_ms,
                    ErrorData::internal_error(format!("Check panicked: {}", message)),
                )
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_check(check.name(), outcome.passed, elapsed.as_secs_f64());
        }

        outcome
    }
}

fn ended_without_report() -> Error {
    Error::Internal("Test run ended without a report".to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A test run in progress
///
/// Completes exactly once, with the report of the whole suite. A report
/// seen through `try_report` is kept, so `wait` still returns it.
pub struct TestRun {
    receiver: Option<oneshot::Receiver<TestReport>>,
    report: Option<TestReport>,
    finished: Arc<AtomicBool>,
}

impl TestRun {
    /// Wait for the run to finish
    ///
    /// # Errors
    ///
    /// `Error::Internal` if the run never started or its task died.
    pub async fn wait(self) -> Result<TestReport> {
        if let Some(report) = self.report {
            return Ok(report);
        }
        match self.receiver {
            Some(rx) => rx.await.map_err(|_| ended_without_report()),
            None => Err(ended_without_report()),
        }
    }

    /// The report, if the run has already finished
    pub fn try_report(&mut self) -> Option<TestReport> {
        if self.report.is_none() {
            if let Some(rx) = self.receiver.as_mut() {
                match rx.try_recv() {
                    Ok(report) => {
                        self.report = Some(report);
                        self.receiver = None;
                    }
                    Err(TryRecvError::Closed) => self.receiver = None,
                    Err(TryRecvError::Empty) => {}
                }
            }
        }
        self.report.clone()
    }

    /// Whether the run has finished (or can no longer finish)
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use isolink_core::CallRequest;
    use isolink_host::{from_sync_fn, Isolate};
    use serde_json::json;

    struct PanickingCheck;

    #[async_trait]
    impl Check for PanickingCheck {
        fn name(&self) -> &str {
            "panics"
        }

        async fn run(&self, _isolate: &IsolateHandle, _timeout: Duration) -> Result<()> {
            panic!("check blew up");
        }
    }

    fn ping_isolate() -> Isolate {
        Isolate::builder()
            .name("tester-unit")
            .handler("ping", from_sync_fn(|_| Ok(json!({"result": "pong"}))))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_suite_passes() {
        let isolate = ping_isolate();
        let tester = RpcTester::new(isolate.handle());
        assert_eq!(tester.check_names(), vec!["ping returns pong".to_string()]);

        let report = tester.start_test().wait().await.unwrap();

        assert_eq!(report.isolate, "tester-unit");
        assert_eq!(report.total(), 1);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_panicking_check_is_a_failure() {
        let isolate = ping_isolate();
        let tester = RpcTester::builder(isolate.handle())
            .check(PanickingCheck)
            .check(crate::ExpectResult::ping())
            .build()
            .unwrap();

        let report = tester.run().await;

        assert_eq!(report.total(), 2);
        assert_eq!(report.failed(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.name, "panics");
        assert!(failure
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("check blew up"));
    }

    #[tokio::test]
    async fn test_run_reports_call_errors() {
        let isolate = ping_isolate();
        let tester = RpcTester::builder(isolate.handle())
            .check(crate::ExpectResult::new(
                "missing",
                CallRequest::new("missing"),
                Default::default(),
            ))
            .build()
            .unwrap();

        let report = tester.run().await;
        let error = report.failures().next().unwrap().error.clone().unwrap();
        assert_eq!(error.code, isolink_core::error::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_is_finished_and_try_report() {
        let isolate = ping_isolate();
        let mut run = RpcTester::new(isolate.handle()).start_test();

        for _ in 0..100 {
            if run.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(run.is_finished());
        assert!(run.try_report().unwrap().is_success());
    }

    #[tokio::test]
    async fn test_wait_after_try_report_returns_same_report() {
        let isolate = ping_isolate();
        let mut run = RpcTester::new(isolate.handle()).start_test();

        for _ in 0..100 {
            if run.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let seen = run.try_report().unwrap();
        assert_eq!(run.try_report().unwrap().total(), seen.total());

        let waited = run.wait().await.unwrap();
        assert_eq!(waited.total(), seen.total());
        assert!(waited.is_success());
    }

    #[tokio::test]
    async fn test_huge_iteration_count_starts_without_preallocating() {
        let isolate = ping_isolate();
        let mut run = RpcTester::builder(isolate.handle())
            .iterations(u32::MAX)
            .build()
            .unwrap()
            .start_test();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!run.is_finished());
        assert!(run.try_report().is_none());
    }

    #[test]
    fn test_start_outside_runtime_does_not_panic() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let isolate = runtime.block_on(async { ping_isolate() });

        let run = RpcTester::new(isolate.handle()).start_test();

        assert!(run.is_finished());
        let result = runtime.block_on(run.wait());
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
