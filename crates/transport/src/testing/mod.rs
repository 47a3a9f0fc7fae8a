//! Testing utilities for code built on a [`Transport`](crate::Transport)
//!
//! - **StubTransport**: records every call, answers through a handler closure,
//!   fails on chosen call numbers and counts pool releases
//!
//! # Example
//!
//! ```ignore
//! use remtx_transport::testing::StubTransport;
//!
//! let stub = StubTransport::returning(json!(42)).fail_on_call(3, || Error::connection("reset"));
//! ```

mod stub;

pub use stub::{RecordedCall, StubTransport};
