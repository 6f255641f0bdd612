//! Checks the tester runs against an isolate
//!
//! A check is one expectation about an isolate: "calling X returns Y",
//! "calling X fails with code Z", "X can be queued". Checks are async and
//! report failure through `Error`; anything that isn't one of the isolate's
//! own errors is wrapped as `Error::Remote` with the `CHECK_FAILED` code so
//! the report can tell assertion failures from call failures.
//!
//! # Examples
//!
//! ```rust
//! use isolink_core::{CallRequest, CallResult};
//! use isolink_tester::{ExpectError, ExpectResult, NotifyOnly};
//!
//! let ping = ExpectResult::ping();
//! let echo = ExpectResult::new(
//!     "echo returns input",
//!     CallRequest::with_params("echo", serde_json::json!({"x": 1})),
//!     CallResult::new().with("x", 1),
//! );
//! let missing = ExpectError::new("unknown method", CallRequest::new("nope"), -32601);
//! let fire = NotifyOnly::new("fire and forget", CallRequest::new("ping"));
//! ```

use async_trait::async_trait;
use isolink_core::{CallRequest, CallResult, Error, ErrorData, Result};
use isolink_host::IsolateHandle;
use serde_json::json;
use std::time::Duration;

/// Error code for a check whose expectation did not hold
pub const CHECK_FAILED: i32 = -32010;

fn check_failed(message: impl Into<String>, data: serde_json::Value) -> Error {
    Error::Remote(ErrorData::with_data(CHECK_FAILED, message, data))
}

/// One expectation about an isolate
#[async_trait]
pub trait Check: Send + Sync {
    /// Name shown in the report
    fn name(&self) -> &str;

    /// Run the check; `timeout` bounds each call it makes
    async fn run(&self, isolate: &IsolateHandle, timeout: Duration) -> Result<()>;
}

/// Execute a request and require an exact result object
#[derive(Debug, Clone)]
pub struct ExpectResult {
    name: String,
    request: CallRequest,
    expected: CallResult,
}

impl ExpectResult {
    pub fn new(name: impl Into<String>, request: CallRequest, expected: CallResult) -> Self {
        Self {
            name: name.into(),
            request,
            expected,
        }
    }

    /// `ping` must answer `{"result": "pong"}`
    pub fn ping() -> Self {
        Self::new(
            "ping returns pong",
            CallRequest::new("ping"),
            CallResult::new().with(CallResult::RESULT_FIELD, "pong"),
        )
    }
}

#[async_trait]
impl Check for ExpectResult {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, isolate: &IsolateHandle, timeout: Duration) -> Result<()> {
        let actual = isolate
            .execute_with_timeout(self.request.clone(), timeout)
            .await?;

        if actual != self.expected {
            return Err(check_failed(
                format!("Unexpected result for {}", self.request),
                json!({
                    "expected": self.expected.clone().into_value(),
                    "actual": actual.into_value(),
                }),
            ));
        }
        Ok(())
    }
}

/// Execute a request and require it to fail with a given code
#[derive(Debug, Clone)]
pub struct ExpectError {
    name: String,
    request: CallRequest,
    code: i32,
}

impl ExpectError {
    pub fn new(name: impl Into<String>, request: CallRequest, code: i32) -> Self {
        Self {
            name: name.into(),
            request,
            code,
        }
    }
}

#[async_trait]
impl Check for ExpectError {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, isolate: &IsolateHandle, timeout: Duration) -> Result<()> {
        match isolate
            .execute_with_timeout(self.request.clone(), timeout)
            .await
        {
            Err(e) if e.code() == self.code => Ok(()),
            Err(e) => Err(check_failed(
                format!("Wrong error for {}", self.request),
                json!({"expected_code": self.code, "actual": ErrorData::from(&e)}),
            )),
            Ok(result) => Err(check_failed(
                format!("Expected {} to fail", self.request),
                json!({"expected_code": self.code, "actual": result.into_value()}),
            )),
        }
    }
}

/// Queue a notification; succeeds if the isolate accepted it
#[derive(Debug, Clone)]
pub struct NotifyOnly {
    name: String,
    request: CallRequest,
}

impl NotifyOnly {
    pub fn new(name: impl Into<String>, request: CallRequest) -> Self {
        Self {
            name: name.into(),
            request,
        }
    }
}

#[async_trait]
impl Check for NotifyOnly {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, isolate: &IsolateHandle, _timeout: Duration) -> Result<()> {
        isolate.notify(self.request.clone())
    }
}
