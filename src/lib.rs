//! remtx - compensating transactions over a stateless JSON-RPC record service
//!
//! The remote service accepts one call at a time and offers no transaction
//! protocol. remtx groups record mutations into transactions anyway: it queues
//! them, replays them in order on commit and, when one fails, undoes the ones
//! already sent.
//!
//! # Quick Start
//!
//! ```ignore
//! use remtx::{TransactionManager, TransportConfig, CONFIG_FILE_NAME};
//! use std::path::Path;
//!
//! let config = TransportConfig::from_file(Path::new(CONFIG_FILE_NAME))?;
//! let manager = TransactionManager::from_config(config)?;
//!
//! manager
//!     .transaction(true, |txn| {
//!         txn.create("res.partner", values)?;
//!         txn.write("res.partner", [7], changes)
//!     })
//!     .await?;
//!
//! manager.close().await;
//! ```
//!
//! # Architecture
//!
//! - `remtx-core`: error taxonomy, remote error mapping, compensation reports
//! - `remtx-wire`: JSON-RPC envelopes
//! - `remtx-transport`: the [`Transport`] trait and its pooled HTTP implementation
//! - `remtx-concurrency`: operation log, compensation, [`TransactionManager`]

pub use remtx_concurrency::{
    Compensation, ObjectCalls, Operation, PreImage, RecordCalls, RemoteCall, Transaction,
    TransactionManager, TransactionStats,
};
pub use remtx_core::{
    map_remote_error, CommitFailure, CompensationOutcome, CompensationReport, CompensationStatus,
    Error, ErrorKind, FieldValues, OperationKind, RecordId, RemoteFault, Result, TransactionState,
    TxnId,
};
pub use remtx_transport::{HttpTransport, Transport, TransportConfig, CONFIG_FILE_NAME};
pub use remtx_wire::RequestId;

/// Test doubles: scriptable transport and in-memory record store
pub mod testing {
    pub use remtx_concurrency::testing::InMemoryRecords;
    pub use remtx_transport::testing::{RecordedCall, StubTransport};
}
