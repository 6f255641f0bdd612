//! Call types exchanged between native callers and an isolate
//!
//! The bridge moves two kinds of values:
//!
//! 1. **CallRequest**: an operation name plus an optional JSON payload
//! 2. **CallResult**: a mapping from field names to JSON values, produced by
//!    the handler registered under the operation name
//!
//! Both serialize to plain JSON objects, so they can cross any boundary that
//! carries JSON text (see `codec`).
//!
//! # Examples
//!
//! ```rust
//! use isolink_core::{CallRequest, CallResult};
//!
//! let request = CallRequest::new("ping");
//! assert_eq!(request.method, "ping");
//!
//! let result = CallResult::new().with("result", "pong");
//! assert_eq!(result.get_str("result"), Some("pong"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A call into an isolate, keyed by operation name
///
/// Serialized as `{"method": "...", "params": ...}`; `params` is omitted when
/// the operation takes no payload (the ping operation takes none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Name of the operation to invoke
    pub method: String,
    /// Optional payload handed to the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl CallRequest {
    /// Create a request without a payload
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Create a request carrying `params`
    ///
    /// ```rust
    /// use isolink_core::CallRequest;
    /// use serde_json::json;
    ///
    /// let req = CallRequest::with_params("echo", json!({"text": "hi"}));
    /// assert!(req.params.is_some());
    /// ```
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

impl fmt::Display for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            Some(params) => write!(f, "{}({})", self.method, params),
            None => write!(f, "{}()", self.method),
        }
    }
}

/// Result object returned by a handler
///
/// A mapping from field names to JSON values. The ping handler returns a
/// single field, `result`, holding the string `"pong"`.
///
/// # Normalization
///
/// Handlers may return any JSON value. `CallResult::from_value` keeps
/// objects as they are and wraps everything else under the `result` key, so
/// callers always receive a mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallResult {
    fields: Map<String, Value>,
}

impl CallResult {
    /// Field name used when a non-object value is wrapped
    pub const RESULT_FIELD: &'static str = "result";

    /// Create an empty result object
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Add a field, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Normalize a handler's return value into a result object
    ///
    /// ```rust
    /// use isolink_core::CallResult;
    /// use serde_json::json;
    ///
    /// let wrapped = CallResult::from_value(json!("pong"));
    /// assert_eq!(wrapped.get_str("result"), Some("pong"));
    ///
    /// let kept = CallResult::from_value(json!({"status": "ok"}));
    /// assert_eq!(kept.get_str("status"), Some("ok"));
    /// ```
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => Self::new().with(Self::RESULT_FIELD, other),
        }
    }

    /// Get a field by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a string field by name
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the result has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for CallResult {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<CallResult> for Value {
    fn from(result: CallResult) -> Self {
        result.into_value()
    }
}

impl fmt::Display for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_omits_empty_params() {
        let json = serde_json::to_string(&CallRequest::new("ping")).unwrap();
        assert_eq!(json, r#"{"method":"ping"}"#);
    }

    #[test]
    fn test_request_deserialization_without_params() {
        let req: CallRequest = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert_eq!(req, CallRequest::new("ping"));
    }

    #[test]
    fn test_request_display() {
        assert_eq!(CallRequest::new("ping").to_string(), "ping()");
        assert_eq!(
            CallRequest::with_params("add", json!([1, 2])).to_string(),
            "add([1,2])"
        );
    }

    #[test]
    fn test_result_serializes_as_plain_object() {
        let result = CallResult::new().with("result", "pong");
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"result": "pong"}));
    }

    #[test]
    fn test_result_wraps_non_objects() {
        assert_eq!(CallResult::from_value(json!(42)).into_value(), json!({"result": 42}));
        assert_eq!(CallResult::from_value(Value::Null).into_value(), json!({"result": null}));
    }

    #[test]
    fn test_result_insert_replaces() {
        let mut result = CallResult::new().with("a", 1);
        let previous = result.insert("a", 2);
        assert_eq!(previous, Some(json!(1)));
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("a"), Some(&json!(2)));
    }
}
