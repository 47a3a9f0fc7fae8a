//! Compensation reports
//!
//! A commit failure is modelled as two slots: the primary failure (`cause`)
//! and a side list of compensation outcomes. Compensation errors live in the
//! report and can never replace the cause.

use crate::error::Error;
use crate::types::{OperationKind, RecordId, TxnId};

/// What happened when the runtime tried to undo one executed operation
#[derive(Debug)]
pub enum CompensationStatus {
    /// The compensating call succeeded
    Compensated,
    /// The compensating call failed; the error is kept, not raised
    Failed(Error),
    /// No compensation exists (executed UNLINK)
    Irreversible,
}

/// Outcome for a single executed operation
#[derive(Debug)]
pub struct CompensationOutcome {
    /// Position of the operation in the transaction's log
    pub operation: usize,
    /// Kind of the original operation
    pub kind: OperationKind,
    /// Remote model the operation targeted
    pub model: String,
    /// Record ids the operation affected
    pub record_ids: Vec<RecordId>,
    /// Result of the compensation attempt
    pub status: CompensationStatus,
}

impl CompensationOutcome {
    /// Whether the operation's effect was undone
    pub fn is_compensated(&self) -> bool {
        matches!(self.status, CompensationStatus::Compensated)
    }
}

/// Per-transaction record of what executed and how it was undone
///
/// `outcomes` is in the order compensations were attempted, which is the
/// reverse of execution order.
#[derive(Debug, Default)]
pub struct CompensationReport {
    /// Operations that executed on the remote, in execution order
    pub executed: Vec<usize>,
    /// Operations that were never sent
    pub never_executed: Vec<usize>,
    /// Compensation outcomes, in attempt order
    pub outcomes: Vec<CompensationOutcome>,
}

impl CompensationReport {
    /// Operations whose effect was undone, in attempt order
    pub fn compensated(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| o.is_compensated())
            .map(|o| o.operation)
            .collect()
    }

    /// Outcomes whose compensating call failed
    pub fn failed(&self) -> impl Iterator<Item = &CompensationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, CompensationStatus::Failed(_)))
    }

    /// Outcomes that could not be compensated at all
    pub fn irreversible(&self) -> impl Iterator<Item = &CompensationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, CompensationStatus::Irreversible))
    }

    /// Operations left in effect on the remote: failed plus irreversible
    pub fn uncompensated(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_compensated())
            .map(|o| o.operation)
            .collect()
    }

    /// True when every executed operation was compensated
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(CompensationOutcome::is_compensated)
    }
}

/// Failure raised by a commit: root cause plus compensation report
#[derive(Debug, thiserror::Error)]
#[error("transaction {txn_id} commit failed at operation {failed_operation}: {cause}")]
pub struct CommitFailure {
    /// Transaction that failed
    pub txn_id: TxnId,
    /// Position of the operation whose execution failed
    pub failed_operation: usize,
    /// The original failure; always what the caller sees as the cause
    #[source]
    pub cause: Error,
    /// Compensation outcomes for operations executed before the failure
    pub report: CompensationReport,
}
