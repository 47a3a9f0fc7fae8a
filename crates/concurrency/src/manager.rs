//! Transaction manager for coordinating commits against the remote service
//!
//! The remote offers no transaction protocol, so atomicity is approximated:
//! operations are replayed in insertion order and, if one fails, every
//! executed operation is compensated in reverse order.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Active → Committing (InvalidState otherwise, no call made)
//! 2. For each operation in insertion order:
//!      WRITE: read the pre-image
//!      send create / write / unlink, mark executed
//! 3a. All sent: Committing → Committed, successful += 1, deregister
//! 3b. One failed: Committing → Failed, compensate executed operations
//!     newest first, failed += 1, deregister, return TransactionCommit
//! ```
//!
//! Steps 2-3 run on a spawned task, so dropping the caller's future does not
//! interrupt an in-flight call, the compensation sequence or the bookkeeping.
//! The task writes each executed operation, and a failure's compensation
//! report, back to the transaction's journal, where the handle still finds
//! them.
//!
//! ## Bookkeeping
//!
//! The registry of live transactions and the two counters sit behind one
//! mutex. It is taken only at begin and at terminal transitions and never held
//! across a network call. Lock order is registry, then a transaction's state.

use crate::calls::{ObjectCalls, RecordCalls};
use crate::executor::{compensate, execute};
use crate::operation::Operation;
use crate::transaction::{Journal, StateCell, Transaction};
use parking_lot::Mutex;
use remtx_core::{
    CommitFailure, CompensationReport, Error, FieldValues, OperationKind, RecordId, Result,
    TransactionState, TxnId,
};
use remtx_transport::{HttpTransport, Transport, TransportConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of manager-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    /// Transactions that committed
    pub successful: u64,
    /// Transactions that failed to commit or were rolled back
    pub failed: u64,
    /// Transactions registered and not yet finished
    pub active: usize,
}

impl TransactionStats {
    /// Transactions that reached an outcome
    pub fn finished(&self) -> u64 {
        self.successful + self.failed
    }

    /// Share of finished transactions that committed, 0.0 when none finished
    pub fn success_rate(&self) -> f64 {
        match self.finished() {
            0 => 0.0,
            n => self.successful as f64 / n as f64,
        }
    }
}

// ============================================================================
// Bookkeeping
// ============================================================================

/// How a transaction left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Committed,
    Failed,
}

#[derive(Debug, Default)]
struct Registry {
    live: HashMap<TxnId, Arc<StateCell>>,
    successful: u64,
    failed: u64,
}

/// Registry and counters shared by a manager and all of its handles
#[derive(Debug, Default)]
pub(crate) struct Bookkeeping {
    registry: Mutex<Registry>,
    next_txn_id: AtomicU64,
}

impl Bookkeeping {
    /// Allocate an id and register a fresh `Active` transaction
    pub(crate) fn register(&self) -> (TxnId, Arc<StateCell>) {
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed) + 1);
        let cell = Arc::new(StateCell::new());
        self.registry.lock().live.insert(id, Arc::clone(&cell));
        (id, cell)
    }

    /// Deregister and count one outcome
    ///
    /// A transaction is counted once: finishing an id that is no longer
    /// registered changes nothing.
    pub(crate) fn finish(&self, id: TxnId, outcome: Outcome) -> bool {
        let mut registry = self.registry.lock();
        if registry.live.remove(&id).is_none() {
            return false;
        }
        match outcome {
            Outcome::Committed => registry.successful += 1,
            Outcome::Failed => registry.failed += 1,
        }
        true
    }

    pub(crate) fn stats(&self) -> TransactionStats {
        let registry = self.registry.lock();
        TransactionStats {
            successful: registry.successful,
            failed: registry.failed,
            active: registry.live.len(),
        }
    }

    /// Roll back every registered transaction that is still `Active`
    ///
    /// Transactions mid-commit or mid-rollback are left to finish on their own.
    /// Returns how many were rolled back.
    fn force_rollback_active(&self) -> usize {
        let mut registry = self.registry.lock();
        let abandoned: Vec<TxnId> = registry
            .live
            .iter()
            .filter(|(id, cell)| {
                cell.transition(
                    **id,
                    &[TransactionState::Active],
                    TransactionState::RolledBack,
                    "force a rollback",
                )
                .is_ok()
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &abandoned {
            registry.live.remove(id);
        }
        registry.failed += abandoned.len() as u64;
        abandoned.len()
    }
}

// ============================================================================
// Commit job
// ============================================================================

/// Everything the commit loop needs, owned so it can run on its own task
struct CommitJob {
    txn_id: TxnId,
    journal: Arc<Mutex<Journal>>,
    transport: Arc<dyn Transport>,
    calls: Arc<dyn RecordCalls>,
    state: Arc<StateCell>,
    book: Arc<Bookkeeping>,
}

/// Where and why a commit stopped; the compensation report is in the journal
struct Aborted {
    failed_operation: usize,
    cause: Error,
}

impl CommitJob {
    async fn run(self) -> std::result::Result<(), Aborted> {
        let mut index = 0;
        while let Some(mut op) = self.operation(index) {
            debug!(
                target: "remtx::txn",
                txn_id = %self.txn_id,
                operation = index,
                kind = %op.kind(),
                model = %op.model(),
                "Executing operation"
            );
            let executed = execute(&mut op, self.transport.as_ref(), self.calls.as_ref()).await;
            self.store(index, op);
            if let Err(cause) = executed {
                self.fail(index, &cause).await;
                return Err(Aborted {
                    failed_operation: index,
                    cause,
                });
            }
            index += 1;
        }

        self.state.set(TransactionState::Committed);
        self.book.finish(self.txn_id, Outcome::Committed);
        info!(
            target: "remtx::txn",
            txn_id = %self.txn_id,
            operations = index,
            "Transaction committed"
        );
        Ok(())
    }

    fn operation(&self, index: usize) -> Option<Operation> {
        self.journal.lock().operations.get(index).cloned()
    }

    fn store(&self, index: usize, op: Operation) {
        if let Some(slot) = self.journal.lock().operations.get_mut(index) {
            *slot = op;
        }
    }

    /// Compensate, then leave the report in the journal before deregistering
    async fn fail(&self, failed_operation: usize, cause: &Error) {
        self.state.set(TransactionState::Failed);
        warn!(
            target: "remtx::txn",
            txn_id = %self.txn_id,
            operation = failed_operation,
            error = %cause,
            "Commit failed, compensating executed operations"
        );

        let operations = self.journal.lock().operations.clone();
        let report = compensate(
            self.txn_id,
            &operations,
            self.transport.as_ref(),
            self.calls.as_ref(),
        )
        .await;

        if !report.is_clean() {
            warn!(
                target: "remtx::txn",
                txn_id = %self.txn_id,
                uncompensated = ?report.uncompensated(),
                "Executed operations left in effect"
            );
        }
        self.journal.lock().pending_report = Some(report);
        self.book.finish(self.txn_id, Outcome::Failed);
    }
}

// ============================================================================
// Transaction manager
// ============================================================================

/// Manages transaction lifecycles and drives commits through a [`Transport`]
///
/// Safe to share between tasks; per-transaction state lives in each
/// [`Transaction`] handle.
pub struct TransactionManager {
    transport: Arc<dyn Transport>,
    calls: Arc<dyn RecordCalls>,
    book: Arc<Bookkeeping>,
}

impl TransactionManager {
    /// Manager using `object.execute_kw` call shapes
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_calls(transport, Arc::new(ObjectCalls::new()))
    }

    /// Manager using custom call shapes
    pub fn with_calls(transport: Arc<dyn Transport>, calls: Arc<dyn RecordCalls>) -> Self {
        TransactionManager {
            transport,
            calls,
            book: Arc::new(Bookkeeping::default()),
        }
    }

    /// Manager over a new [`HttpTransport`]
    ///
    /// # Errors
    /// `Configuration` for an invalid config, `Connection` when the HTTP client
    /// cannot be built.
    pub fn from_config(config: TransportConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Transport every call goes through
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Start a transaction
    ///
    /// No network call is made.
    pub fn begin(&self, auto_commit: bool) -> Transaction {
        let (id, state) = self.book.register();
        debug!(target: "remtx::txn", txn_id = %id, auto_commit, "Transaction started");
        Transaction::new(id, auto_commit, state, Arc::clone(&self.book))
    }

    /// Append an operation to `txn`
    ///
    /// # Errors
    /// `InvalidState` unless `txn` is `Active`.
    pub fn add_operation(
        &self,
        txn: &mut Transaction,
        kind: OperationKind,
        model: impl Into<String>,
        record_ids: impl IntoIterator<Item = RecordId>,
        payload: FieldValues,
    ) -> Result<usize> {
        txn.add_operation(kind, model, record_ids, payload)
    }

    /// Send every queued operation
    ///
    /// # Errors
    /// - `InvalidState` unless `txn` is `Active`; nothing is sent
    /// - `TransactionCommit` when an operation fails; it carries the original
    ///   failure and the compensation report, and `txn` is left `Failed`
    /// - `Runtime` when the task driving the commit was cancelled by runtime
    ///   shutdown
    pub async fn commit(&self, txn: &mut Transaction) -> Result<()> {
        txn.state.transition(
            txn.id(),
            &[TransactionState::Active],
            TransactionState::Committing,
            "commit",
        )?;

        let job = CommitJob {
            txn_id: txn.id(),
            journal: Arc::clone(&txn.journal),
            transport: Arc::clone(&self.transport),
            calls: Arc::clone(&self.calls),
            state: Arc::clone(&txn.state),
            book: Arc::clone(&txn.book),
        };

        match tokio::spawn(job.run()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(Aborted {
                failed_operation,
                cause,
            })) => {
                let report = txn.journal.lock().take_report();
                Err(Error::TransactionCommit(Box::new(CommitFailure {
                    txn_id: txn.id(),
                    failed_operation,
                    cause,
                    report,
                })))
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::Runtime {
                reason: format!("commit task for {} did not complete: {}", txn.id(), e),
            }),
        }
    }

    /// Undo every executed operation and close the transaction
    ///
    /// From `Active` nothing has executed, so no call is made. From `Failed`
    /// compensation already ran during the commit and is not repeated. The
    /// returned report then carries the commit's outcomes only when the
    /// commit's caller stopped waiting before it could receive them, and no
    /// outcomes otherwise.
    ///
    /// # Errors
    /// `InvalidState` unless `txn` is `Active` or `Failed`.
    pub async fn rollback(&self, txn: &mut Transaction) -> Result<CompensationReport> {
        let previous = txn.state.transition(
            txn.id(),
            &[TransactionState::Active, TransactionState::Failed],
            TransactionState::RollingBack,
            "roll back",
        )?;

        if previous == TransactionState::Failed {
            let report = txn.journal.lock().take_report();
            txn.state.set(TransactionState::RolledBack);
            info!(target: "remtx::txn", txn_id = %txn.id(), "Failed transaction closed");
            return Ok(report);
        }

        let operations = txn.operations();
        let report = compensate(
            txn.id(),
            &operations,
            self.transport.as_ref(),
            self.calls.as_ref(),
        )
        .await;
        txn.state.set(TransactionState::RolledBack);
        txn.book.finish(txn.id(), Outcome::Failed);
        info!(
            target: "remtx::txn",
            txn_id = %txn.id(),
            discarded = report.never_executed.len(),
            "Transaction rolled back"
        );
        Ok(report)
    }

    /// Run `body` inside a transaction
    ///
    /// On `Ok` the transaction is committed when `auto_commit` is set and
    /// rolled back otherwise. On `Err` it is rolled back and the body's error
    /// is returned; a rollback failure is logged, never returned in its place.
    /// A body that already ended the transaction itself is left alone.
    pub async fn transaction<T, E, F>(&self, auto_commit: bool, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut txn = self.begin(auto_commit);
        match body(&mut txn) {
            Ok(value) => {
                if txn.is_active() {
                    if auto_commit {
                        self.commit(&mut txn).await?;
                    } else {
                        self.rollback(&mut txn).await?;
                    }
                }
                Ok(value)
            }
            Err(e) => {
                if matches!(txn.state(), TransactionState::Active | TransactionState::Failed) {
                    if let Err(rollback_error) = self.rollback(&mut txn).await {
                        warn!(
                            target: "remtx::txn",
                            txn_id = %txn.id(),
                            error = %rollback_error,
                            "Rollback after failed block also failed"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Current counters and number of live transactions
    pub fn stats(&self) -> TransactionStats {
        self.book.stats()
    }

    /// Roll back transactions still `Active`, then close the transport
    ///
    /// Transactions mid-commit finish on their own tasks and are still
    /// counted. Calling it again only repeats the no-op transport close.
    pub async fn close(&self) {
        let abandoned = self.book.force_rollback_active();
        if abandoned > 0 {
            warn!(target: "remtx::txn", count = abandoned, "Rolled back active transactions on close");
        }
        self.transport.close().await;
        info!(target: "remtx::txn", stats = ?self.stats(), "Transaction manager closed");
    }
}
