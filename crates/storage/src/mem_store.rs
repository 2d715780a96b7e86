//! In-memory sharded store
//!
//! # Design
//!
//! - DashMap keyed by `(table, partition)`: one shard per pair, so workers
//!   on different partitions never touch the same shard lock
//! - FxHashMap within a shard: O(1) key lookup, fast non-crypto hash
//! - Pending insert/delete sets live beside the data they guard
//! - One cache-aligned spinlock per partition for PCC ownership

use crate::record::Record;
use crate::store::Store;
use adaptcc_concurrency::{CacheAligned, Spinlock};
use adaptcc_core::config::EngineConfig;
use adaptcc_core::error::{AbortReason, Error, Result};
use adaptcc_core::protocol::SystemMode;
use adaptcc_core::tuple::Tuple;
use adaptcc_core::types::{Key, PartitionId, TableId};
use adaptcc_core::value::Value;
use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// Records of one table within one partition
#[derive(Debug, Default)]
pub struct Shard {
    data: FxHashMap<Key, Arc<Record>>,
    pending_inserts: FxHashSet<Key>,
    pending_deletes: FxHashSet<Key>,
}

impl Shard {
    /// Create an empty shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the shard holds no records
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sharded in-memory [`Store`]
pub struct MemStore {
    mode: SystemMode,
    tables: usize,
    partitions: usize,
    shards: DashMap<(TableId, PartitionId), Shard>,
    latches: Vec<CacheAligned<Spinlock>>,
}

impl MemStore {
    /// Create an empty store
    pub fn new(mode: SystemMode, tables: usize, partitions: usize, spin_trial: u32) -> Self {
        let shards = DashMap::with_capacity(tables * partitions);
        for t in 0..tables {
            for p in 0..partitions {
                shards.insert((t, p), Shard::new());
            }
        }
        Self {
            mode,
            tables,
            partitions,
            shards,
            latches: (0..partitions)
                .map(|_| CacheAligned::new(Spinlock::new(spin_trial)))
                .collect(),
        }
    }

    /// Create an empty store shaped by `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.mode, config.tables, config.partitions, config.spin_trial)
    }

    /// Load a record outside any transaction
    pub fn load(
        &self,
        table: TableId,
        key: Key,
        partition: PartitionId,
        tuple: Box<dyn Tuple>,
    ) -> Result<()> {
        self.check(table, partition)?;
        let record = Arc::new(self.new_record(key, tuple));
        let mut shard = self.shard_mut(table, partition)?;
        if shard.data.contains_key(&key) {
            return Err(Error::DuplicateKey { table, key });
        }
        shard.data.insert(key, record);
        Ok(())
    }

    /// Read a committed column outside any transaction
    pub fn peek(&self, table: TableId, key: &Key, partition: PartitionId, col: usize) -> Result<Value> {
        self.get_record(table, key, partition)?.get_value(col)
    }

    /// Whether `key` is published
    pub fn contains(&self, table: TableId, key: &Key, partition: PartitionId) -> bool {
        self.shards
            .get(&(table, partition))
            .map(|shard| shard.data.contains_key(key))
            .unwrap_or(false)
    }

    /// Records in one table across all partitions
    pub fn table_len(&self, table: TableId) -> usize {
        self.shards
            .iter()
            .filter(|entry| entry.key().0 == table)
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Keys of one shard, sorted
    pub fn keys(&self, table: TableId, partition: PartitionId) -> Vec<Key> {
        self.shards
            .get(&(table, partition))
            .map(|shard| {
                let mut keys: Vec<Key> = shard.data.keys().copied().collect();
                keys.sort();
                keys
            })
            .unwrap_or_default()
    }

    /// Outstanding insert plus delete reservations
    pub fn pending_reservations(&self) -> usize {
        self.shards
            .iter()
            .map(|entry| entry.value().pending_inserts.len() + entry.value().pending_deletes.len())
            .sum()
    }

    fn check(&self, table: TableId, partition: PartitionId) -> Result<()> {
        if table >= self.tables {
            return Err(Error::UnknownTable(table));
        }
        if partition >= self.partitions {
            return Err(Error::UnknownPartition(partition));
        }
        Ok(())
    }

    fn shard_mut(
        &self,
        table: TableId,
        partition: PartitionId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, (TableId, PartitionId), Shard>> {
        self.check(table, partition)?;
        self.shards
            .get_mut(&(table, partition))
            .ok_or(Error::UnknownPartition(partition))
    }
}

impl Store for MemStore {
    #[inline]
    fn get_record(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<Arc<Record>> {
        self.check(table, partition)?;
        self.shards
            .get(&(table, partition))
            .and_then(|shard| shard.data.get(key).cloned())
            .ok_or(Error::NoSuchKey { table, key: *key })
    }

    fn prepare_insert(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<()> {
        let mut shard = self.shard_mut(table, partition)?;
        if shard.data.contains_key(key) {
            return Err(Error::DuplicateKey { table, key: *key });
        }
        if !shard.pending_inserts.insert(*key) {
            debug!(table, %key, "insert reservation held elsewhere");
            return Err(Error::Conflict(AbortReason::InsertReserved));
        }
        Ok(())
    }

    fn release_insert(&self, table: TableId, key: &Key, partition: PartitionId) {
        if let Ok(mut shard) = self.shard_mut(table, partition) {
            shard.pending_inserts.remove(key);
        }
    }

    fn prepare_delete(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<()> {
        let mut shard = self.shard_mut(table, partition)?;
        if !shard.data.contains_key(key) {
            return Err(Error::NoSuchKey { table, key: *key });
        }
        if !shard.pending_deletes.insert(*key) {
            debug!(table, %key, "delete reservation held elsewhere");
            return Err(Error::Conflict(AbortReason::DeleteReserved));
        }
        Ok(())
    }

    fn release_delete(&self, table: TableId, key: &Key, partition: PartitionId) {
        if let Ok(mut shard) = self.shard_mut(table, partition) {
            shard.pending_deletes.remove(key);
        }
    }

    fn insert_records(&self, table: TableId, batch: Vec<(PartitionId, Arc<Record>)>) -> Result<()> {
        for (partition, record) in batch {
            let key = record.key();
            let mut shard = self.shard_mut(table, partition)?;
            shard.pending_inserts.remove(&key);
            shard.data.insert(key, record);
        }
        Ok(())
    }

    fn delete_record(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<()> {
        let mut shard = self.shard_mut(table, partition)?;
        shard.pending_deletes.remove(key);
        shard
            .data
            .remove(key)
            .map(|_| ())
            .ok_or(Error::NoSuchKey { table, key: *key })
    }

    fn new_record(&self, key: Key, tuple: Box<dyn Tuple>) -> Record {
        Record::new(self.mode, key, tuple)
    }

    fn partition_latch(&self, partition: PartitionId) -> Result<&Spinlock> {
        self.latches
            .get(partition)
            .map(|latch| &**latch)
            .ok_or(Error::UnknownPartition(partition))
    }

    fn mode(&self) -> SystemMode {
        self.mode
    }

    fn partitions(&self) -> usize {
        self.partitions
    }

    fn tables(&self) -> usize {
        self.tables
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore")
            .field("mode", &self.mode)
            .field("tables", &self.tables)
            .field("partitions", &self.partitions)
            .finish()
    }
}
