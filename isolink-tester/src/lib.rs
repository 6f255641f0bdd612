//! Native tester for isolate operations
//!
//! The tester plays the native side of the bridge: it calls operations on an
//! isolate through its `IsolateHandle` and checks what comes back. A run is
//! started without blocking and signals completion with a `TestReport`.
//!
//! # Core Features
//!
//! - **Non-blocking start**: `RpcTester::start_test` spawns the run and
//!   returns a `TestRun` immediately
//! - **Completion signal**: `TestRun::wait` resolves to the report
//! - **Pluggable checks**: the `Check` trait with `ExpectResult`,
//!   `ExpectError` and `NotifyOnly` built in
//! - **Failure capture**: call errors, mismatches and panics become failed
//!   outcomes in the report
//! - **Observability**: `tracing` events and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use isolink_host::{from_sync_fn, Isolate};
//! use isolink_tester::RpcTester;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let isolate = Isolate::builder()
//!         .handler("ping", from_sync_fn(|_| Ok(serde_json::json!({"result": "pong"}))))
//!         .build()?;
//!
//!     let report = RpcTester::new(isolate.handle()).start_test().wait().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

mod builder;
mod check;
mod metrics;
mod report;
mod tester;

pub use builder::{TesterBuilder, DEFAULT_CHECK_TIMEOUT};
pub use check::{Check, ExpectError, ExpectResult, NotifyOnly, CHECK_FAILED};
pub use metrics::TesterMetrics;
pub use report::{CheckOutcome, TestReport};
pub use tester::{RpcTester, TestRun};
