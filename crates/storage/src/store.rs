//! Store contract consumed by the transaction engine

use crate::record::Record;
use adaptcc_concurrency::Spinlock;
use adaptcc_core::error::Result;
use adaptcc_core::protocol::SystemMode;
use adaptcc_core::tuple::Tuple;
use adaptcc_core::types::{Key, PartitionId, TableId};
use std::sync::Arc;

/// Record lookup, insert/delete reservations, and structural changes
///
/// Reservations make inserts and deletes visible to other transactions
/// before commit: a second `prepare_*` on the same key fails with a
/// conflict until the holder releases it or applies the change.
pub trait Store: Send + Sync {
    /// Fetch a record; `NoSuchKey` if absent
    fn get_record(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<Arc<Record>>;

    /// Reserve `key` for insertion
    ///
    /// Fails with `DuplicateKey` if the key exists, or with an
    /// `InsertReserved` conflict if another insert holds it.
    fn prepare_insert(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<()>;

    /// Drop an insert reservation
    fn release_insert(&self, table: TableId, key: &Key, partition: PartitionId);

    /// Reserve `key` for deletion
    ///
    /// Fails with `NoSuchKey` if absent, or with a `DeleteReserved`
    /// conflict if another delete holds it.
    fn prepare_delete(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<()>;

    /// Drop a delete reservation
    fn release_delete(&self, table: TableId, key: &Key, partition: PartitionId);

    /// Publish reserved inserts, clearing their reservations
    fn insert_records(&self, table: TableId, batch: Vec<(PartitionId, Arc<Record>)>) -> Result<()>;

    /// Remove a reserved record, clearing its reservation
    fn delete_record(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<()>;

    /// Build an unpublished record of the variant this store holds
    fn new_record(&self, key: Key, tuple: Box<dyn Tuple>) -> Record;

    /// Latch serialising PCC access to one partition
    fn partition_latch(&self, partition: PartitionId) -> Result<&Spinlock>;

    /// Record variant this store builds
    fn mode(&self) -> SystemMode;

    /// Number of partitions
    fn partitions(&self) -> usize;

    /// Number of tables
    fn tables(&self) -> usize;
}
