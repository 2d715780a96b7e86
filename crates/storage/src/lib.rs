//! Record model and storage for the transaction engine
//!
//! - [`record`]: the four record variants and their capability surfaces
//! - [`store`]: the [`Store`] contract the engine consumes
//! - [`mem_store`]: sharded in-memory implementation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mem_store;
pub mod record;
pub mod store;

pub use mem_store::{MemStore, Shard};
pub use record::{
    AdaptiveRecord, LockArgs, LockSurface, LockingRecord, OccRecord, OccSurface, PartitionRecord,
    Record, RecordAccess,
};
pub use store::Store;
