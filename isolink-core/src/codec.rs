//! Codec for call request and result text
//!
//! Native callers often hold requests as JSON text rather than typed values.
//! This module converts between the two and maps serde failures onto the
//! isolink error kinds:
//!
//! - Text that is not JSON → `Error::Parse`
//! - JSON that is not a call request (e.g. missing `method`) → `Error::InvalidRequest`
//! - Anything that cannot be serialized → `Error::Serialization`
//!
//! # Examples
//!
//! ```rust
//! use isolink_core::{codec, CallRequest};
//!
//! let text = codec::encode_request(&CallRequest::new("ping")).unwrap();
//! let decoded = codec::decode_request(&text).unwrap();
//! assert_eq!(decoded.method, "ping");
//! ```

use crate::error::{Error, ErrorData, Result};
use crate::types::{CallRequest, CallResult};
use serde::{Deserialize, Serialize};

/// Encode any serializable value to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a JSON string to a specific type
///
/// Unlike `decode_request`, this does not distinguish parse failures from
/// shape mismatches; both are reported as `Error::Serialization`.
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a call request to JSON
pub fn encode_request(req: &CallRequest) -> Result<String> {
    encode(req)
}

/// Decode a call request from JSON text
///
/// # Errors
///
/// - `Error::Parse` if the text is not JSON at all
/// - `Error::InvalidRequest` if it is JSON but not a request object
///
/// ```rust
/// use isolink_core::{codec, Error};
///
/// assert!(matches!(codec::decode_request("{not json"), Err(Error::Parse(_))));
/// assert!(matches!(codec::decode_request("[1,2]"), Err(Error::InvalidRequest(_))));
/// ```
pub fn decode_request(data: &str) -> Result<CallRequest> {
    // Two steps so the error says which of the two things went wrong
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Parse(e.to_string()))?;

    if !value.is_object() {
        return Err(Error::InvalidRequest(
            "Call request must be a JSON object".to_string(),
        ));
    }

    let request: CallRequest =
        serde_json::from_value(value).map_err(|e| Error::InvalidRequest(e.to_string()))?;

    if request.method.is_empty() {
        return Err(Error::InvalidRequest("Method name is empty".to_string()));
    }

    Ok(request)
}

/// Encode a result object to JSON
pub fn encode_result(result: &CallResult) -> Result<String> {
    encode(result)
}

/// Decode a result object from JSON
///
/// Any JSON value is accepted; non-objects are wrapped under `result`
/// the same way handler return values are.
pub fn decode_result(data: &str) -> Result<CallResult> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(CallResult::from_value(value))
}

/// Encode an error as a failure object: `{"error": {"code": ..., "message": ...}}`
///
/// ```rust
/// use isolink_core::{codec, Error};
///
/// let text = codec::encode_error(&Error::MethodNotFound("pong".into())).unwrap();
/// assert!(text.contains("-32601"));
/// ```
pub fn encode_error(error: &Error) -> Result<String> {
    #[derive(Serialize)]
    struct Failure {
        error: ErrorData,
    }

    encode(&Failure {
        error: ErrorData::from(error),
    })
}
