//! Identifiers and enums shared by every layer
//!
//! Nothing in here performs I/O. The transport only needs [`FieldValues`] and
//! [`RecordId`] to describe payloads; the transaction layer adds the state
//! machine and operation kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a record on the remote service
pub type RecordId = i64;

/// Field name → value mapping used for create/write payloads and pre-images
pub type FieldValues = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Transaction identity
// ============================================================================

/// Opaque transaction identifier, unique per manager instance
///
/// Allocated from a monotonically increasing counter, so ids are never reused
/// for the lifetime of the manager that handed them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw counter value
    pub const fn new(raw: u64) -> Self {
        TxnId(raw)
    }

    /// Raw counter value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

// ============================================================================
// Transaction state machine
// ============================================================================

/// Lifecycle state of a transaction
///
/// State transitions:
/// - `Active` → `Committing` (commit requested)
/// - `Committing` → `Committed` (every operation executed)
/// - `Committing` → `Failed` (an operation failed, compensation attempted)
/// - `Active` | `Failed` → `RollingBack` → `RolledBack`
///
/// `Committed` and `RolledBack` admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Accepting operations, nothing sent yet
    Active,
    /// Operations are being replayed through the transport
    Committing,
    /// All operations executed
    Committed,
    /// Commit failed; executed operations were compensated best-effort
    Failed,
    /// Rollback in progress
    RollingBack,
    /// Rolled back
    RolledBack,
}

impl TransactionState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    /// Lower-case name used in messages and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::Failed => "failed",
            TransactionState::RollingBack => "rolling_back",
            TransactionState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Kind of remote mutation recorded in a transaction's operation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Create a new record from a payload
    Create,
    /// Update fields of existing records
    Write,
    /// Delete existing records
    Unlink,
}

impl OperationKind {
    /// Method name the remote service uses for this mutation
    pub fn method_name(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Write => "write",
            OperationKind::Unlink => "unlink",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}
