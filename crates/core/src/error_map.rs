//! Classification of remote error envelopes
//!
//! [`map_remote_error`] is the only place that looks at the contents of an
//! error payload. It is pure and total: every combination of code, message and
//! data yields exactly one [`Error`].
//!
//! | code | nested name | result |
//! |------|-------------|--------|
//! | -32700, -32600, -32602 | - | `Validation` |
//! | -32601 | - | `MethodNotFound` |
//! | -32603 | - | `Internal` |
//! | -32000 | `*.AccessError` | `Access` |
//! | -32000 | `*.ValidationError`, `*.UserError` | `Validation` |
//! | -32000 | `*.MissingError` | `Validation` ("Record not found") |
//! | -32000 | `*.AuthenticationError` | `Authentication` |
//! | -32000 | other / absent | `Remote` ("Server error: ...") |
//! | any | message absent | `Remote` ("Unknown error") |

use crate::error::{Error, RemoteFault};
use serde_json::Value;

/// JSON-RPC parse error
pub const PARSE_ERROR: i64 = -32700;
/// JSON-RPC invalid request
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC method not found
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC invalid params
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC internal error
pub const INTERNAL_ERROR: i64 = -32603;
/// Application-level server error; the nested `data.name` says which
pub const SERVER_ERROR: i64 = -32000;

const UNKNOWN_ERROR: &str = "Unknown error";
const RECORD_NOT_FOUND: &str = "Record not found";

/// Map an error envelope to a concrete [`Error`]
///
/// # Arguments
/// * `code` - protocol error code
/// * `message` - error message, `None` when the envelope had none
/// * `data` - nested payload; `data.name` names the server exception class,
///   `data.debug` carries the traceback
pub fn map_remote_error(code: i64, message: Option<&str>, data: Option<&Value>) -> Error {
    let traceback = data
        .and_then(|d| d.get("debug"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let fault = |message: String| {
        RemoteFault::new(message)
            .with_context("code", Value::from(code))
            .with_context("data", data.cloned().unwrap_or(Value::Null))
            .with_traceback(traceback.clone())
    };

    let message = match message {
        Some(m) => m,
        None => return Error::Remote(fault(UNKNOWN_ERROR.to_string())),
    };

    match code {
        PARSE_ERROR | INVALID_REQUEST | INVALID_PARAMS => Error::Validation(fault(message.to_string())),
        METHOD_NOT_FOUND => Error::MethodNotFound(fault(message.to_string())),
        INTERNAL_ERROR => Error::Internal(fault(message.to_string())),
        SERVER_ERROR => {
            let class = data
                .and_then(|d| d.get("name"))
                .and_then(Value::as_str)
                .map(exception_class);
            match class {
                Some("AccessError") => Error::Access(fault(message.to_string())),
                Some("ValidationError") | Some("UserError") => {
                    Error::Validation(fault(message.to_string()))
                }
                Some("MissingError") => Error::Validation(fault(record_not_found(message))),
                Some("AuthenticationError") => Error::Authentication(fault(message.to_string())),
                _ => Error::Remote(fault(format!("Server error: {}", message))),
            }
        }
        _ => Error::Remote(fault(message.to_string())),
    }
}

/// Last dotted segment of a qualified exception name
fn exception_class(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn record_not_found(message: &str) -> String {
    if message.contains(RECORD_NOT_FOUND) {
        message.to_string()
    } else if message.is_empty() {
        RECORD_NOT_FOUND.to_string()
    } else {
        format!("{}: {}", RECORD_NOT_FOUND, message)
    }
}
