//! Request/Response envelope encoding for the JSON-RPC wire protocol
//!
//! Defines the wire format for remote procedure calls:
//! - Request: `{jsonrpc: "2.0", method: "call", params: {service, method, args}, id}`
//! - Success response: `{jsonrpc: "2.0", id, result}`
//! - Error response: `{jsonrpc: "2.0", id, error: {code, message, data: {name, debug}}}`

use remtx_core::{map_remote_error, Error, RemoteFault, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version tag sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Envelope-level method; the actual target lives in `params`
pub const CALL_METHOD: &str = "call";

/// Correlation token echoed by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id
    Number(u64),
    /// Textual id
    Text(String),
}

impl RequestId {
    /// Fresh random id
    pub fn generate() -> Self {
        RequestId::Text(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Text(s.to_string())
    }
}

// ============================================================================
// Request
// ============================================================================

/// Target of a call: remote service, method and positional arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    /// Remote service name (e.g. "object", "common")
    pub service: String,
    /// Method on that service
    pub method: String,
    /// Positional arguments, forwarded untouched
    pub args: Vec<Value>,
}

/// Wire protocol request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Always "call"
    pub method: String,
    /// Call target
    pub params: CallParams,
    /// Correlation token
    pub id: RequestId,
}

impl Request {
    /// Build a call envelope; generates an id when none is supplied
    pub fn call(
        service: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
        id: Option<RequestId>,
    ) -> Self {
        Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: CALL_METHOD.to_string(),
            params: CallParams {
                service: service.into(),
                method: method.into(),
                args,
            },
            id: id.unwrap_or_else(RequestId::generate),
        }
    }

    /// "service.method", used in logs and timeout messages
    pub fn target(&self) -> String {
        format!("{}.{}", self.params.service, self.params.method)
    }
}

/// Encode a request to JSON bytes
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    serde_json::to_vec(request).map_err(|e| Error::Validation(RemoteFault::new(format!(
        "failed to encode request: {}",
        e
    ))))
}

// ============================================================================
// Response
// ============================================================================

/// Error object of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Protocol error code
    pub code: i64,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
    /// Nested payload: `name` of the server exception class, `debug` traceback
    #[serde(default)]
    pub data: Option<Value>,
}

impl ErrorEnvelope {
    /// Server exception class name, if present
    pub fn name(&self) -> Option<&str> {
        self.data.as_ref()?.get("name")?.as_str()
    }

    /// Server traceback, if present
    pub fn debug(&self) -> Option<&str> {
        self.data.as_ref()?.get("debug")?.as_str()
    }

    /// Classify into a concrete error
    pub fn into_error(self) -> Error {
        map_remote_error(self.code, self.message.as_deref(), self.data.as_ref())
    }
}

/// Wire protocol response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version tag
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation token from the request
    #[serde(default)]
    pub id: Option<RequestId>,
    /// Result payload; `Some(Value::Null)` for an explicit `null`
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

/// Distinguishes `"result": null` from a missing `result`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Response {
    /// Create a success response
    pub fn success(id: RequestId, result: Value) -> Self {
        Response {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn failure(id: RequestId, error: ErrorEnvelope) -> Self {
        Response {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    /// Result payload, or the mapped error
    ///
    /// `error` wins if a server sends both. An envelope with neither is an
    /// unrecognized shape and becomes a generic remote error.
    pub fn into_result(self) -> Result<Value> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error.into_error()),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(Error::Remote(RemoteFault::new(
                "malformed response: neither result nor error present",
            ))),
        }
    }
}

/// Decode a response from JSON bytes
///
/// A body that is not a JSON-RPC envelope means the exchange produced nothing
/// usable, so it is reported as a connection error.
pub fn decode_response(body: &[u8]) -> Result<Response> {
    serde_json::from_slice(body)
        .map_err(|e| Error::connection_caused_by("malformed response body", e))
}
