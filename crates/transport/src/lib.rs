//! Transport layer for remtx
//!
//! This crate owns the only resource shared across transactions: the outbound
//! connection pool. It provides:
//! - [`Transport`]: the call / health check / close contract
//! - [`HttpTransport`]: JSON-RPC over pooled HTTP with per-call deadlines
//! - [`TransportConfig`]: `remtx.toml` configuration
//! - [`testing`]: a scriptable stub for exercising higher layers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod http;
pub mod testing;
pub mod transport;

pub use config::{TransportConfig, CONFIG_FILE_NAME};
pub use http::HttpTransport;
pub use transport::Transport;
