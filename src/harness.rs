//! The ping/pong harness
//!
//! Wires an isolate, the native tester and process termination together:
//!
//! 1. The isolate has `ping` registered (see `ping_handler`)
//! 2. The harness starts the tester against it
//! 3. Depending on the `ExitPolicy`, it waits a fixed delay or for the
//!    tester's report (bounded by a guard delay)
//! 4. It returns a `HarnessOutcome` carrying the exit code
//!
//! The harness never exits the process itself; the `ping_pong` binary does
//! that with the outcome's code. The isolate handle and the scheduler are
//! passed in, so tests drive the harness with their own.
//!
//! # Configuration
//!
//! `HarnessConfig::from_env` reads:
//!
//! - `ISOLINK_EXIT_POLICY`: `delay` or `completion` (default `completion`)
//! - `ISOLINK_EXIT_DELAY_MS`: fixed delay, or guard for `completion` (default 100)
//! - `ISOLINK_STRICT`: `1`/`true` makes a failed or missing report exit 1
//! - `ISOLINK_ITERATIONS`: suite repetitions, 1 to `MAX_ITERATIONS` (default 1)
//! - `ISOLINK_CALL_TIMEOUT_MS`: per-call timeout of the tester (default 1000)

use isolink_core::{Error, Result};
use isolink_host::{from_sync_fn, Handler, IsolateHandle, Scheduler};
use isolink_tester::{RpcTester, TestReport, DEFAULT_CHECK_TIMEOUT};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Operation name the tester calls
pub const PING_METHOD: &str = "ping";

/// Default exit delay, and default guard when waiting for completion
pub const DEFAULT_EXIT_DELAY: Duration = Duration::from_millis(100);

/// Largest suite repetition count accepted from the environment
pub const MAX_ITERATIONS: u32 = 10_000;

/// Handler answering `{"result": "pong"}`, ignoring its params
pub fn ping_handler() -> Box<dyn Handler> {
    from_sync_fn(|_| Ok(json!({"result": "pong"})))
}

/// When the harness finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Wait exactly this long, whatever the tester is doing
    FixedDelay(Duration),
    /// Finish when the tester reports, but never later than `guard`
    OnCompletion { guard: Duration },
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy::OnCompletion {
            guard: DEFAULT_EXIT_DELAY,
        }
    }
}

/// Harness settings
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub exit_policy: ExitPolicy,
    /// Exit 1 on a failed or missing report
    pub strict: bool,
    /// Suite repetitions
    pub iterations: u32,
    /// Per-call timeout of the tester
    pub call_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            exit_policy: ExitPolicy::default(),
            strict: false,
            iterations: 1,
            call_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

impl HarnessConfig {
    /// Read the configuration from `ISOLINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name
    /// to its value
    ///
    /// # Errors
    ///
    /// `Error::InvalidParams` naming the variable that holds a bad value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let delay = match lookup("ISOLINK_EXIT_DELAY_MS") {
            Some(ms) => Duration::from_millis(parse_var("ISOLINK_EXIT_DELAY_MS", &ms)?),
            None => DEFAULT_EXIT_DELAY,
        };

        let exit_policy = match lookup("ISOLINK_EXIT_POLICY").as_deref().map(str::trim) {
            None | Some("") | Some("completion") => ExitPolicy::OnCompletion { guard: delay },
            Some("delay") => ExitPolicy::FixedDelay(delay),
            Some(other) => {
                return Err(Error::InvalidParams(format!(
                    "ISOLINK_EXIT_POLICY: expected 'delay' or 'completion', got '{}'",
                    other
                )))
            }
        };

        let strict = match lookup("ISOLINK_STRICT").as_deref().map(str::trim) {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(Error::InvalidParams(format!(
                    "ISOLINK_STRICT: expected a boolean, got '{}'",
                    other
                )))
            }
        };

        let iterations = match lookup("ISOLINK_ITERATIONS") {
            Some(n) => parse_var("ISOLINK_ITERATIONS", &n)?,
            None => 1,
        };
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(Error::InvalidParams(format!(
                "ISOLINK_ITERATIONS: expected 1..={}, got {}",
                MAX_ITERATIONS, iterations
            )));
        }

        let call_timeout = match lookup("ISOLINK_CALL_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(parse_var("ISOLINK_CALL_TIMEOUT_MS", &ms)?),
            None => DEFAULT_CHECK_TIMEOUT,
        };

        Ok(Self {
            exit_policy,
            strict,
            iterations,
            call_timeout,
        })
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn iterations(mut self, n: u32) -> Self {
        self.iterations = n;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidParams(format!("{}: {}", name, e)))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// What the harness observed
#[derive(Debug, Clone)]
pub struct HarnessOutcome {
    /// Process exit code to use
    pub exit_code: i32,
    /// Tester report, if it arrived in time
    pub report: Option<TestReport>,
    /// Time from start of the harness to its decision
    pub elapsed: Duration,
    /// Policy that was applied
    pub policy: ExitPolicy,
}

/// Runs the tester against an isolate and decides the exit code
pub struct Harness {
    isolate: IsolateHandle,
    scheduler: Scheduler,
    config: HarnessConfig,
    metrics: bool,
}

impl Harness {
    pub fn new(isolate: IsolateHandle, scheduler: Scheduler, config: HarnessConfig) -> Self {
        Self {
            isolate,
            scheduler,
            config,
            metrics: false,
        }
    }

    /// Record tester metrics
    pub fn with_metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Start the tester and wait according to the exit policy
    ///
    /// # Errors
    ///
    /// `Error::Internal` if the exit timer is lost before it fires. Tester
    /// failures are not errors; they are in the report.
    #[tracing::instrument(skip(self), fields(isolate = %self.isolate.name(), policy = ?self.config.exit_policy))]
    pub async fn run(&self) -> Result<HarnessOutcome> {
        let start = Instant::now();

        let mut tester = RpcTester::builder(self.isolate.clone())
            .iterations(self.config.iterations)
            .call_timeout(self.config.call_timeout);
        if self.metrics {
            tester = tester.with_metrics();
        }
        let mut run = tester.build()?.start_test();

        let policy = self.config.exit_policy;
        let report = match policy {
            ExitPolicy::FixedDelay(delay) => {
                self.sleep(delay).0.await.map_err(|_| {
                    Error::Internal("Exit timer dropped before firing".to_string())
                })?;
                let report = run.try_report();
                if report.is_none() {
                    tracing::warn!(delay_ms = millis(delay), "Tester did not finish before exit");
                }
                report
            }
            ExitPolicy::OnCompletion { guard } => {
                let (fired, timer) = self.sleep(guard);
                tokio::select! {
                    report = run.wait() => {
                        timer.cancel();
                        match report {
                            Ok(report) => Some(report),
                            Err(e) => {
                                tracing::error!(error = %e, "Tester ended without a report");
                                None
                            }
                        }
                    }
                    _ = fired => {
                        tracing::warn!(guard_ms = millis(guard), "Guard elapsed before tester finished");
                        None
                    }
                }
            }
        };

        let passed = report.as_ref().is_some_and(TestReport::is_success);
        let exit_code = if self.config.strict && !passed { 1 } else { 0 };
        let elapsed = start.elapsed();

        match report {
            Some(ref report) => tracing::info!(
                exit_code,
                elapsed_ms = millis(elapsed),
                report = %report,
                "Harness finished"
            ),
            None => tracing::info!(
                exit_code,
                elapsed_ms = millis(elapsed),
                "Harness finished without a report"
            ),
        }

        Ok(HarnessOutcome {
            exit_code,
            report,
            elapsed,
            policy,
        })
    }

    fn sleep(&self, delay: Duration) -> (oneshot::Receiver<()>, isolink_host::TimerHandle) {
        let (tx, rx) = oneshot::channel();
        let timer = self.scheduler.set_timeout(delay, move || {
            let _ = tx.send(());
        });
        (rx, timer)
    }
}
