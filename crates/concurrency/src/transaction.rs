//! Transaction handle and its state cell
//!
//! Only the task holding a [`Transaction`] appends to its operation log. The
//! log sits in a `Journal` shared with the commit task, which writes every
//! executed operation and its compensation report back there, so nothing is
//! lost when the caller stops waiting for the commit. The lifecycle state
//! lives in a [`StateCell`] shared with the manager's registry so that `close`
//! can force-roll-back transactions it does not own.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──commit──► Committing ──► Committed
//!    │                   └────────► Failed ──┐
//!    └──rollback──► RollingBack ◄────────────┘
//!                        └────────► RolledBack
//! ```
//!
//! A handle dropped while `Active` is rolled back locally and counted as
//! failed. Nothing has reached the remote at that point, so no call is needed.

use crate::executor::partition;
use crate::manager::{Bookkeeping, Outcome};
use crate::operation::Operation;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remtx_core::{
    CompensationReport, Error, FieldValues, OperationKind, RecordId, Result, TransactionState,
    TxnId,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// State cell
// ============================================================================

/// Lifecycle state shared between a handle and the manager's registry
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<TransactionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        StateCell {
            state: Mutex::new(TransactionState::Active),
        }
    }

    pub(crate) fn get(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Move to `to` if the current state is one of `allowed`
    ///
    /// Returns the state that was replaced.
    ///
    /// # Errors
    /// `InvalidState` naming `action` when the current state is not allowed.
    pub(crate) fn transition(
        &self,
        txn_id: TxnId,
        allowed: &[TransactionState],
        to: TransactionState,
        action: &'static str,
    ) -> Result<TransactionState> {
        let mut state = self.state.lock();
        if !allowed.contains(&*state) {
            return Err(Error::InvalidState {
                txn_id,
                state: *state,
                action,
            });
        }
        Ok(std::mem::replace(&mut *state, to))
    }

    /// Unconditional move, for steps whose precondition is already held
    pub(crate) fn set(&self, to: TransactionState) {
        *self.state.lock() = to;
    }

    /// Run `f` while holding the state lock, if the state is `Active`
    fn with_active<T>(&self, txn_id: TxnId, action: &'static str, f: impl FnOnce() -> T) -> Result<T> {
        let state = self.state.lock();
        if *state != TransactionState::Active {
            return Err(Error::InvalidState {
                txn_id,
                state: *state,
                action,
            });
        }
        Ok(f())
    }
}

// ============================================================================
// Journal
// ============================================================================

/// Operation log plus the compensation report of a failed commit
#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub(crate) operations: Vec<Operation>,
    /// Set by a failed commit, taken by whoever reports the failure
    pub(crate) pending_report: Option<CompensationReport>,
}

impl Journal {
    /// Report left by a failed commit, or one listing executed and
    /// never-executed operations with no outcomes
    pub(crate) fn take_report(&mut self) -> CompensationReport {
        match self.pending_report.take() {
            Some(report) => report,
            None => {
                let (executed, never_executed) = partition(&self.operations);
                CompensationReport {
                    executed,
                    never_executed,
                    outcomes: Vec::new(),
                }
            }
        }
    }
}

// ============================================================================
// Transaction handle
// ============================================================================

/// Handle to one transaction, obtained from
/// [`TransactionManager::begin`](crate::TransactionManager::begin)
///
/// Operations are recorded locally and only sent on commit. Every handle must
/// end in a commit or a rollback; dropping an `Active` handle rolls it back.
pub struct Transaction {
    id: TxnId,
    auto_commit: bool,
    created_at: DateTime<Utc>,
    pub(crate) journal: Arc<Mutex<Journal>>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) book: Arc<Bookkeeping>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, auto_commit: bool, state: Arc<StateCell>, book: Arc<Bookkeeping>) -> Self {
        Transaction {
            id,
            auto_commit,
            created_at: Utc::now(),
            journal: Arc::new(Mutex::new(Journal::default())),
            state,
            book,
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Whether the scoped context commits on normal exit
    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// When the transaction began
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// Check if transaction is still accepting operations
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Snapshot of the operation log, in insertion order
    ///
    /// Reflects executed flags and assigned ids as soon as the commit task
    /// records them.
    pub fn operations(&self) -> Vec<Operation> {
        self.journal.lock().operations.clone()
    }

    fn operation_count(&self) -> usize {
        self.journal.lock().operations.len()
    }

    /// Append an operation to the log
    ///
    /// Purely local. Returns the operation's position in the log.
    ///
    /// # Errors
    /// `InvalidState` unless the transaction is `Active`.
    pub fn add_operation(
        &mut self,
        kind: OperationKind,
        model: impl Into<String>,
        record_ids: impl IntoIterator<Item = RecordId>,
        payload: FieldValues,
    ) -> Result<usize> {
        let op = Operation::new(kind, model, record_ids, payload);
        let journal = &self.journal;
        let index = self.state.with_active(self.id, "add an operation", move || {
            let mut journal = journal.lock();
            journal.operations.push(op);
            journal.operations.len() - 1
        })?;
        debug!(target: "remtx::txn", txn_id = %self.id, operation = index, kind = %kind, "Operation queued");
        Ok(index)
    }

    /// Queue a CREATE of one record
    pub fn create(&mut self, model: impl Into<String>, values: FieldValues) -> Result<usize> {
        self.add_operation(OperationKind::Create, model, [], values)
    }

    /// Queue a WRITE of `values` to `ids`
    pub fn write(
        &mut self,
        model: impl Into<String>,
        ids: impl IntoIterator<Item = RecordId>,
        values: FieldValues,
    ) -> Result<usize> {
        self.add_operation(OperationKind::Write, model, ids, values)
    }

    /// Queue an UNLINK of `ids`
    pub fn unlink(&mut self, model: impl Into<String>, ids: impl IntoIterator<Item = RecordId>) -> Result<usize> {
        self.add_operation(OperationKind::Unlink, model, ids, FieldValues::new())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("auto_commit", &self.auto_commit)
            .field("created_at", &self.created_at)
            .field("operations", &self.operation_count())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let abandoned = self
            .state
            .transition(
                self.id,
                &[TransactionState::Active],
                TransactionState::RollingBack,
                "drop",
            )
            .is_ok();
        if abandoned {
            self.state.set(TransactionState::RolledBack);
            self.book.finish(self.id, Outcome::Failed);
            warn!(
                target: "remtx::txn",
                txn_id = %self.id,
                operations = self.operation_count(),
                "Transaction dropped while active, rolled back"
            );
        }
    }
}
