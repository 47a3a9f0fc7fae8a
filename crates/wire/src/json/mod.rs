//! JSON-RPC 2.0 encoding

mod envelope;

pub use envelope::{
    decode_response, encode_request, CallParams, ErrorEnvelope, Request, RequestId, Response,
    CALL_METHOD, JSONRPC_VERSION,
};
