//! Transaction management for remtx
//!
//! Groups remote record mutations into transactions the remote service does
//! not itself support:
//! - Operation log: mutations queued locally, sent only on commit
//! - Compensation: executed operations undone newest first when a commit fails
//! - Bookkeeping: live-transaction registry and outcome counters, safe under
//!   concurrent use
//!
//! # Example
//!
//! ```ignore
//! let manager = TransactionManager::new(Arc::new(HttpTransport::new(config)?));
//!
//! let mut txn = manager.begin(true);
//! txn.create("res.partner", values)?;
//! txn.write("res.partner", [7], changes)?;
//! manager.commit(&mut txn).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calls;
mod executor;
pub mod manager;
pub mod operation;
pub mod testing;
pub mod transaction;

pub use calls::{ObjectCalls, RecordCalls, RemoteCall};
pub use manager::{TransactionManager, TransactionStats};
pub use operation::{Compensation, Operation, PreImage};
pub use transaction::Transaction;
