//! Core types for remtx
//!
//! This crate defines the pieces every other layer agrees on:
//! - Error: the closed error taxonomy and the [`ErrorKind`] discriminant
//! - Error mapping: classification of remote error envelopes
//! - Types: transaction ids, the transaction state machine, operation kinds
//! - Reports: compensation outcomes attached to failed commits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod error_map;
pub mod report;
pub mod types;

pub use error::{BoxError, Error, ErrorKind, RemoteFault, Result};
pub use error_map::map_remote_error;
pub use report::{CommitFailure, CompensationOutcome, CompensationReport, CompensationStatus};
pub use types::{FieldValues, OperationKind, RecordId, TransactionState, TxnId};
