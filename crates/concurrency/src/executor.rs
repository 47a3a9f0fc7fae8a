//! Operation execution and compensation
//!
//! Both halves talk to the remote only through [`Transport`]; call shapes come
//! from [`RecordCalls`]. Nothing here touches transaction state or the
//! manager's bookkeeping.

use crate::calls::{RecordCalls, RemoteCall};
use crate::operation::{Compensation, Operation, PreImage};
use remtx_core::{
    CompensationOutcome, CompensationReport, CompensationStatus, Error, OperationKind, RecordId,
    RemoteFault, Result, TxnId,
};
use remtx_transport::Transport;
use serde_json::Value;
use tracing::{debug, warn};

async fn send(transport: &dyn Transport, call: RemoteCall) -> Result<Value> {
    transport.call(&call.service, &call.method, call.args, None).await
}

/// Execute one operation
///
/// A WRITE first reads the fields it is about to overwrite. CREATE records the
/// ids the server assigned. The operation is marked executed as soon as its
/// mutating call succeeds; a failed call leaves it untouched.
///
/// A CREATE whose result yields no ids is executed all the same. The decode
/// error is returned and the operation's ids stay empty, so it cannot be
/// compensated.
pub(crate) async fn execute(
    op: &mut Operation,
    transport: &dyn Transport,
    calls: &dyn RecordCalls,
) -> Result<()> {
    match op.kind {
        OperationKind::Create => {
            let result = send(transport, calls.create(&op.model, &op.payload)).await?;
            op.executed = true;
            op.record_ids = calls.created_ids(result)?;
        }
        OperationKind::Write => {
            let pre_image = capture_pre_image(op, transport, calls).await?;
            send(transport, calls.write(&op.model, &op.record_ids, &op.payload)).await?;
            op.pre_image = Some(pre_image);
            op.executed = true;
        }
        OperationKind::Unlink => {
            send(transport, calls.unlink(&op.model, &op.record_ids)).await?;
            op.executed = true;
        }
    }
    Ok(())
}

/// Read the current values of the fields a WRITE will overwrite
///
/// The result is ordered like the operation's record ids and keeps only the
/// requested fields.
async fn capture_pre_image(
    op: &Operation,
    transport: &dyn Transport,
    calls: &dyn RecordCalls,
) -> Result<PreImage> {
    let fields = op.payload_fields();
    let result = send(transport, calls.read(&op.model, &op.record_ids, &fields)).await?;
    let mut records = calls.read_records(result)?;

    let mut pre_image = Vec::with_capacity(op.record_ids.len());
    for id in &op.record_ids {
        let position = records
            .iter()
            .position(|(record_id, _)| record_id == id)
            .ok_or_else(|| record_not_found(&op.model, *id))?;
        let (_, mut values) = records.swap_remove(position);
        values.retain(|field, _| fields.contains(field));
        pre_image.push((*id, values));
    }
    Ok(pre_image)
}

fn record_not_found(model: &str, id: RecordId) -> Error {
    Error::Validation(
        RemoteFault::new(format!("Record not found: {}({})", model, id))
            .with_context("model", Value::from(model))
            .with_context("id", Value::from(id)),
    )
}

/// Indices of executed and never-executed operations, in log order
pub(crate) fn partition(operations: &[Operation]) -> (Vec<usize>, Vec<usize>) {
    (0..operations.len()).partition(|&i| operations[i].executed)
}

/// Undo every executed operation, newest first
///
/// Each compensation is attempted independently. Failures are recorded in the
/// report and never returned.
pub(crate) async fn compensate(
    txn_id: TxnId,
    operations: &[Operation],
    transport: &dyn Transport,
    calls: &dyn RecordCalls,
) -> CompensationReport {
    let (executed, never_executed) = partition(operations);
    let mut outcomes = Vec::with_capacity(executed.len());

    for &index in executed.iter().rev() {
        let op = &operations[index];
        let status = match op.compensation() {
            Some(compensation) => {
                run_compensation(txn_id, index, compensation, transport, calls).await
            }
            None => continue,
        };
        outcomes.push(CompensationOutcome {
            operation: index,
            kind: op.kind,
            model: op.model.clone(),
            record_ids: op.record_ids.clone(),
            status,
        });
    }

    CompensationReport {
        executed,
        never_executed,
        outcomes,
    }
}

async fn run_compensation(
    txn_id: TxnId,
    index: usize,
    compensation: Compensation,
    transport: &dyn Transport,
    calls: &dyn RecordCalls,
) -> CompensationStatus {
    let result = match compensation {
        Compensation::Unlink { model, record_ids } => {
            send(transport, calls.unlink(&model, &record_ids)).await.map(drop)
        }
        Compensation::Restore { model, records } => {
            // One write per record; keep going after a failure and report the first one
            let mut first_failure = None;
            for (id, values) in &records {
                if let Err(e) = send(transport, calls.write(&model, &[*id], values)).await {
                    first_failure.get_or_insert(e);
                }
            }
            first_failure.map_or(Ok(()), Err)
        }
        Compensation::Irreversible { model, record_ids } => {
            warn!(
                target: "remtx::txn",
                txn_id = %txn_id,
                operation = index,
                model = %model,
                ids = ?record_ids,
                "Operation cannot be compensated"
            );
            return CompensationStatus::Irreversible;
        }
    };

    match result {
        Ok(()) => {
            debug!(target: "remtx::txn", txn_id = %txn_id, operation = index, "Operation compensated");
            CompensationStatus::Compensated
        }
        Err(e) => {
            warn!(
                target: "remtx::txn",
                txn_id = %txn_id,
                operation = index,
                error = %e,
                "Compensation failed"
            );
            CompensationStatus::Failed(e)
        }
    }
}
