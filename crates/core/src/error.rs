//! Error types for remtx
//!
//! Every failure the runtime can surface is a variant of [`Error`]. The enum is
//! closed: remote error payloads are classified once, by
//! [`map_remote_error`](crate::map_remote_error), and never re-inspected later.
//!
//! # Categories
//!
//! | Category | Variants | Origin |
//! |----------|----------|--------|
//! | Network | `Connection`, `Timeout` | transport exchange |
//! | Remote | `Validation`, `MethodNotFound`, `Internal`, `Access`, `Authentication`, `Remote` | error envelope |
//! | Transaction | `InvalidState`, `TransactionCommit` | transaction manager |
//! | System | `Configuration`, `Runtime` | local setup / task runtime |

use crate::report::CommitFailure;
use crate::types::{TransactionState, TxnId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Boxed error used as the underlying cause of connection failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for remtx operations
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Remote fault payload
// ============================================================================

/// Details carried by every error produced from a remote error envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    /// Human-readable message
    pub message: String,
    /// Diagnostic context; for mapped errors always holds `code` and `data`
    pub context: Map<String, Value>,
    /// Server-side traceback, when the server supplied one
    pub server_traceback: Option<String>,
}

impl RemoteFault {
    /// Create a fault with an empty context
    pub fn new(message: impl Into<String>) -> Self {
        RemoteFault {
            message: message.into(),
            context: Map::new(),
            server_traceback: None,
        }
    }

    /// Add a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Attach a server traceback
    pub fn with_traceback(mut self, traceback: Option<String>) -> Self {
        self.server_traceback = traceback;
        self
    }

    /// Protocol error code recorded in the context, if any
    pub fn code(&self) -> Option<i64> {
        self.context.get("code").and_then(Value::as_i64)
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ============================================================================
// Error kind
// ============================================================================

/// Fieldless discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network or HTTP-level failure
    Connection,
    /// Per-call deadline exceeded
    Timeout,
    /// Malformed request or remote-side validation failure
    Validation,
    /// Remote method does not exist
    MethodNotFound,
    /// Remote internal fault
    Internal,
    /// Authorization denied
    Access,
    /// Authentication rejected
    Authentication,
    /// Unrecognized remote error shape
    Remote,
    /// Operation attempted against a transaction in the wrong state
    InvalidState,
    /// Commit failed after a compensation attempt
    TransactionCommit,
    /// Invalid or unreadable configuration
    Configuration,
    /// Background task failure
    Runtime,
}

// ============================================================================
// Error
// ============================================================================

/// Errors produced by the transport and transaction layers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level exchange failed (DNS, refused connection, HTTP status)
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure
        message: String,
        /// HTTP status code when the server answered with a failure status
        status: Option<u16>,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// The exchange exceeded the configured deadline
    #[error("timed out after {elapsed:?}: {message}")]
    Timeout {
        /// What was being waited for
        message: String,
        /// Time spent before giving up
        elapsed: Duration,
    },

    /// Protocol-level malformed request or remote validation failure
    #[error("validation error: {0}")]
    Validation(RemoteFault),

    /// Remote method not found
    #[error("method not found: {0}")]
    MethodNotFound(RemoteFault),

    /// Remote internal error
    #[error("internal server error: {0}")]
    Internal(RemoteFault),

    /// Remote authorization denial
    #[error("access denied: {0}")]
    Access(RemoteFault),

    /// Remote authentication failure
    #[error("authentication failed: {0}")]
    Authentication(RemoteFault),

    /// Catch-all for remote error shapes that match no other variant
    #[error("{0}")]
    Remote(RemoteFault),

    /// Transaction is not in a state that allows the requested action
    #[error("transaction {txn_id} is {state}, cannot {action}")]
    InvalidState {
        /// Transaction the action targeted
        txn_id: TxnId,
        /// State observed when the action was attempted
        state: TransactionState,
        /// Action that was refused
        action: &'static str,
    },

    /// Commit failed; carries the root cause and the compensation report
    #[error(transparent)]
    TransactionCommit(Box<CommitFailure>),

    /// Configuration could not be read or is invalid
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is wrong
        reason: String,
    },

    /// The task driving a commit did not run to completion
    #[error("runtime error: {reason}")]
    Runtime {
        /// What happened to the task
        reason: String,
    },
}

impl Error {
    /// Connection error without an underlying cause
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Connection error wrapping an underlying cause
    pub fn connection_caused_by(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            status: None,
            source: Some(source.into()),
        }
    }

    /// Connection error for a non-success HTTP status
    pub fn http_status(status: u16, body_excerpt: &str) -> Self {
        Error::Connection {
            message: format!("HTTP {}: {}", status, body_excerpt),
            status: Some(status),
            source: None,
        }
    }

    /// Timeout error
    pub fn timeout(message: impl Into<String>, elapsed: Duration) -> Self {
        Error::Timeout {
            message: message.into(),
            elapsed,
        }
    }

    /// Configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }

    /// Discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Validation(_) => ErrorKind::Validation,
            Error::MethodNotFound(_) => ErrorKind::MethodNotFound,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Access(_) => ErrorKind::Access,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Remote(_) => ErrorKind::Remote,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::TransactionCommit(_) => ErrorKind::TransactionCommit,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// Remote fault details, for errors mapped from an error envelope
    pub fn remote_fault(&self) -> Option<&RemoteFault> {
        match self {
            Error::Validation(f)
            | Error::MethodNotFound(f)
            | Error::Internal(f)
            | Error::Access(f)
            | Error::Authentication(f)
            | Error::Remote(f) => Some(f),
            _ => None,
        }
    }

    /// Server traceback, when the remote supplied one
    pub fn server_traceback(&self) -> Option<&str> {
        self.remote_fault()
            .and_then(|f| f.server_traceback.as_deref())
    }

    /// Diagnostic context of a remote error: `code`, raw `data`
    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.remote_fault().map(|f| &f.context)
    }

    /// Commit failure details, for `TransactionCommit` errors
    pub fn commit_failure(&self) -> Option<&CommitFailure> {
        match self {
            Error::TransactionCommit(failure) => Some(&**failure),
            _ => None,
        }
    }

    /// HTTP status, for connection errors raised on a failure status
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Error::Connection { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_connection() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "connection error: refused");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_connection_error_keeps_source() {
        use std::error::Error as _;

        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "nope");
        let err = Error::connection_caused_by("connect failed", io_err);
        let source = err.source().expect("source should be kept");
        assert!(source.to_string().contains("nope"));
    }

    #[test]
    fn test_http_status_error() {
        let err = Error::http_status(502, "bad gateway");
        assert_eq!(err.http_status_code(), Some(502));
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));
    }

    #[test]
    fn test_timeout_display_includes_elapsed() {
        let err = Error::timeout("object.execute_kw", Duration::from_millis(1500));
        let msg = err.to_string();
        assert!(msg.contains("1.5s"));
        assert!(msg.contains("object.execute_kw"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::InvalidState {
            txn_id: TxnId::new(3),
            state: TransactionState::Committed,
            action: "commit",
        };
        assert_eq!(
            err.to_string(),
            "transaction txn-3 is committed, cannot commit"
        );
    }

    #[test]
    fn test_remote_fault_accessors() {
        let fault = RemoteFault::new("boom")
            .with_context("code", Value::from(-32603))
            .with_traceback(Some("Traceback ...".to_string()));
        let err = Error::Internal(fault);

        assert_eq!(err.remote_fault().and_then(RemoteFault::code), Some(-32603));
        assert_eq!(err.server_traceback(), Some("Traceback ..."));
        assert_eq!(err.context().and_then(|c| c.get("code")), Some(&Value::from(-32603)));
        assert!(err.commit_failure().is_none());
    }

    #[test]
    fn test_non_remote_errors_have_no_fault() {
        assert!(Error::config("bad").remote_fault().is_none());
        assert!(Error::connection("x").server_traceback().is_none());
        assert!(Error::connection("x").context().is_none());
    }
}
