//! Core call types, codec and observability for isolink
//!
//! This crate holds everything the isolate host and the native tester share:
//!
//! - **Types**: `CallRequest` (operation name + optional payload) and
//!   `CallResult` (mapping from field names to JSON values)
//! - **Codec**: JSON text encoding/decoding with error mapping
//! - **Error handling**: the `Error` enum and its serializable `ErrorData` form
//! - **Observability**: `tracing` subscriber and OpenTelemetry setup
//!
//! # Example
//!
//! ```rust
//! use isolink_core::{codec, CallRequest, CallResult};
//!
//! let request = codec::decode_request(r#"{"method":"ping"}"#).unwrap();
//! assert_eq!(request, CallRequest::new("ping"));
//!
//! let result = CallResult::new().with("result", "pong");
//! assert_eq!(codec::encode_result(&result).unwrap(), r#"{"result":"pong"}"#);
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, ErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{CallRequest, CallResult};
