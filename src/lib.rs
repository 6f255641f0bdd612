//! isolink - request/response bridge between isolates and native callers
//!
//! This is the convenience crate that re-exports the isolink sub-crates and
//! holds the ping/pong harness.
//!
//! # Architecture
//!
//! - **isolink-core**: call types, codec, error handling, observability
//! - **isolink-host**: isolates, handler routing, the call manager, timers
//! - **isolink-tester**: the native tester and its reports
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use isolink::harness::{ping_handler, Harness, HarnessConfig, PING_METHOD};
//! use isolink::{Isolate, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let isolate = Isolate::builder()
//!         .name("main")
//!         .handler(PING_METHOD, ping_handler())
//!         .build()?;
//!
//!     let outcome = Harness::new(isolate.handle(), Scheduler::current()?, HarnessConfig::default())
//!         .run()
//!         .await?;
//!
//!     isolate.shutdown().await?;
//!     std::process::exit(outcome.exit_code);
//! }
//! ```

pub mod harness;

pub use isolink_core as core;
pub use isolink_host as host;
pub use isolink_tester as tester;

pub use isolink_core::{
    init_observability, shutdown_observability, CallRequest, CallResult, Error, ErrorData,
    ObservabilityConfig, Result,
};
pub use isolink_host::{Isolate, IsolateBuilder, IsolateHandle, Scheduler};
pub use isolink_tester::{RpcTester, TestReport, TestRun};
