//! Mixed-protocol transactions
//!
//! - `tracking`: per-table read/write vectors, reused across transactions
//! - `context`: the transaction handle, read/write dispatch, abort
//! - `commit`: lock, TID, validate, apply

pub mod commit;
pub mod context;
pub mod tracking;

pub use context::{MixedTransaction, TransactionStatus};
pub use tracking::{DeleteEntry, InsertEntry, Mutation, Mutations, ReadEntry, TableTracking, TxnState, WriteEntry};
