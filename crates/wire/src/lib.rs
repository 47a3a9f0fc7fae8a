//! Wire protocol for remtx
//!
//! Requests are JSON-RPC 2.0 `call` envelopes posted to the service's RPC
//! endpoint. Responses carry exactly one of `result` or `error`; decoding an
//! error envelope runs it through the core error mapper, so callers only ever
//! see a `Result<Value>`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod json;

pub use json::{decode_response, encode_request, ErrorEnvelope, Request, RequestId, Response};
