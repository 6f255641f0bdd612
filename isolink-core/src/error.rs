//! Error types for isolink
//!
//! This module provides the error handling used by every isolink crate.
//! It defines two types:
//!
//! - **Error**: Application-level errors returned by host, tester and codec (uses thiserror)
//! - **ErrorData**: Serializable `{code, message, data}` form of an error, used in
//!   test reports and when a failure has to be written out as JSON
//!
//! # Error Codes
//!
//! `ErrorData` reuses the familiar JSON-RPC numbering so reports read the
//! same way as any RPC error log:
//! - `-32700`: Parse error (request text is not JSON)
//! - `-32600`: Invalid request (JSON, but not a call request)
//! - `-32601`: Method not found (no handler registered under the name)
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32001`: Call timed out waiting for the isolate
//! - `-32002`: Isolate terminated before answering
//!
//! # Examples
//!
//! ```rust
//! use isolink_core::{Error, ErrorData};
//!
//! let error = Error::MethodNotFound("ping".into());
//! let data = ErrorData::from(&error);
//! assert_eq!(data.code, -32601);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for isolink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Parse error code
pub const PARSE_ERROR: i32 = -32700;
/// Invalid request code
pub const INVALID_REQUEST: i32 = -32600;
/// Method not found code
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid params code
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error code
pub const INTERNAL_ERROR: i32 = -32603;
/// Call timeout code
pub const TIMEOUT: i32 = -32001;
/// Isolate terminated code
pub const ISOLATE_TERMINATED: i32 = -32002;

/// Application-level error type for isolink operations
///
/// Every fallible isolink operation returns this type. It is `Clone` so a
/// single failure can be fanned out to several waiters (for example when an
/// isolate terminates with calls still queued).
///
/// # Error Categories
///
/// - **Request errors**: Parse, InvalidRequest, MethodNotFound, InvalidParams
/// - **Processing errors**: Serialization, Internal, Remote
/// - **Lifecycle errors**: Timeout, IsolateTerminated
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Error reported in structured form
    ///
    /// Holds an error that was already expressed as `ErrorData`, typically
    /// produced by a handler that wants to control the code it reports.
    #[error("Remote error: {0}")]
    Remote(#[from] ErrorData),

    /// Request text is not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization or deserialization error
    ///
    /// Occurs when converting between Rust types and JSON values.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The request is JSON but not a valid call request
    /// (e.g., missing `method`, wrong types).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No handler is registered for the operation name
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The handler exists but rejected its parameters
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Unexpected failure inside a handler or the host
    #[error("Internal error: {0}")]
    Internal(String),

    /// The caller stopped waiting before the isolate answered
    ///
    /// The call itself may still be processed later; its result is discarded.
    #[error("Call timeout")]
    Timeout,

    /// The isolate's event loop is no longer running
    ///
    /// Returned to calls that were queued when the isolate terminated and to
    /// any call issued afterwards.
    #[error("Isolate terminated")]
    IsolateTerminated,
}

impl Error {
    /// Numeric code for this error (see module docs)
    pub fn code(&self) -> i32 {
        match self {
            Error::Remote(data) => data.code,
            Error::Parse(_) => PARSE_ERROR,
            Error::Serialization(_) => INTERNAL_ERROR,
            Error::InvalidRequest(_) => INVALID_REQUEST,
            Error::MethodNotFound(_) => METHOD_NOT_FOUND,
            Error::InvalidParams(_) => INVALID_PARAMS,
            Error::Internal(_) => INTERNAL_ERROR,
            Error::Timeout => TIMEOUT,
            Error::IsolateTerminated => ISOLATE_TERMINATED,
        }
    }

    /// Short, stable label used as a metric attribute
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Remote(_) => "remote",
            Error::Parse(_) => "parse",
            Error::Serialization(_) => "serialization",
            Error::InvalidRequest(_) => "invalid_request",
            Error::MethodNotFound(_) => "method_not_found",
            Error::InvalidParams(_) => "invalid_params",
            Error::Internal(_) => "internal",
            Error::Timeout => "timeout",
            Error::IsolateTerminated => "isolate_terminated",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Serializable error information
///
/// This is the form an `Error` takes when it has to leave the process
/// boundary: inside a `TestReport`, or encoded as JSON text by the codec.
///
/// # Examples
///
/// ```rust
/// use isolink_core::ErrorData;
/// use serde_json::json;
///
/// let error = ErrorData::with_data(1001, "Pong expected", json!({"got": "ping"}));
/// assert_eq!(error.code, 1001);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Numeric error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorData {
    /// Create a new error with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Create an invalid request error (-32600)
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    /// Create a method not found error (-32601)
    ///
    /// ```rust
    /// use isolink_core::ErrorData;
    ///
    /// let error = ErrorData::method_not_found("ping");
    /// assert_eq!(error.message, "Method not found: ping");
    /// ```
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method.into()))
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Create an internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    /// Create a timeout error (-32001)
    pub fn timeout() -> Self {
        Self::new(TIMEOUT, "Call timeout")
    }

    /// Create an isolate terminated error (-32002)
    pub fn isolate_terminated() -> Self {
        Self::new(ISOLATE_TERMINATED, "Isolate terminated")
    }
}

impl From<&Error> for ErrorData {
    fn from(error: &Error) -> Self {
        match error {
            Error::Remote(data) => data.clone(),
            Error::Parse(msg) => ErrorData::with_data(
                PARSE_ERROR,
                "Parse error",
                serde_json::Value::String(msg.clone()),
            ),
            Error::MethodNotFound(method) => ErrorData::method_not_found(method.clone()),
            Error::Timeout => ErrorData::timeout(),
            Error::IsolateTerminated => ErrorData::isolate_terminated(),
            other => ErrorData::new(other.code(), other.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorData {
    /// Formats as "[code] message", e.g. "[-32601] Method not found: ping"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorData {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_from_serde() {
        let serde_error = serde_json::from_str::<serde_json::Value>(r#"{"invalid": json"#).unwrap_err();
        let error: Error = serde_error.into();

        match error {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_codes() {
        let errors = vec![
            (Error::Parse("x".into()), PARSE_ERROR),
            (Error::InvalidRequest("x".into()), INVALID_REQUEST),
            (Error::MethodNotFound("x".into()), METHOD_NOT_FOUND),
            (Error::InvalidParams("x".into()), INVALID_PARAMS),
            (Error::Internal("x".into()), INTERNAL_ERROR),
            (Error::Timeout, TIMEOUT),
            (Error::IsolateTerminated, ISOLATE_TERMINATED),
        ];

        for (error, expected) in errors {
            assert_eq!(error.code(), expected);
            assert_eq!(ErrorData::from(&error).code, expected);
        }
    }

    #[test]
    fn test_remote_error_keeps_code() {
        let error = Error::Remote(ErrorData::new(1001, "custom"));
        assert_eq!(error.code(), 1001);
        assert_eq!(error.kind(), "remote");
        assert_eq!(ErrorData::from(&error), ErrorData::new(1001, "custom"));
    }

    #[test]
    fn test_method_not_found_data() {
        let data = ErrorData::from(&Error::MethodNotFound("pong".into()));
        assert_eq!(data.message, "Method not found: pong");
        assert!(data.data.is_none());
    }

    #[test]
    fn test_error_data_display() {
        let display = ErrorData::method_not_found("unknownMethod").to_string();
        assert!(display.contains("-32601"));
        assert!(display.contains("unknownMethod"));
    }

    #[test]
    fn test_error_data_serialization() {
        let error = ErrorData::with_data(-32000, "Test error", json!({"key": "value"}));
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: ErrorData = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, error);

        let plain = serde_json::to_string(&ErrorData::timeout()).unwrap();
        assert!(!plain.contains("data"));
    }

    #[test]
    fn test_error_display_formatting() {
        assert_eq!(Error::Timeout.to_string(), "Call timeout");
        assert!(Error::MethodNotFound("testMethod".into()).to_string().contains("testMethod"));
    }
}
