//! Per-transaction read/write tracking
//!
//! Every table gets one [`TableTracking`] holding a vector per protocol
//! family. Vectors are cleared, never dropped, between transactions so a
//! worker stops allocating once warmed up.

use adaptcc_core::error::Result;
use adaptcc_core::tuple::ColumnId;
use adaptcc_core::types::{Key, PartitionId, TableId, Tid};
use adaptcc_core::value::Value;
use adaptcc_storage::Record;
use smallvec::SmallVec;
use std::sync::Arc;

/// One staged column change
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Target column
    pub col: ColumnId,
    /// New value, or the amount to add
    pub value: Value,
    /// Add in place instead of overwrite
    pub delta: bool,
}

/// Staged changes to one record, in program order
pub type Mutations = SmallVec<[Mutation; 4]>;

/// A record this transaction has read
#[derive(Debug)]
pub struct ReadEntry {
    /// Record key
    pub key: Key,
    /// Partition holding the record
    pub partition: PartitionId,
    /// The record as found in the store
    pub record: Arc<Record>,
    /// Version observed at read time (OCC) or lock time (2PL)
    pub tid: Tid,
    /// 2PL: a shared lock is held
    pub exists: bool,
}

/// A record this transaction will write
#[derive(Debug)]
pub struct WriteEntry {
    /// Record key
    pub key: Key,
    /// Partition holding the record
    pub partition: PartitionId,
    /// The record as found in the store
    pub record: Arc<Record>,
    /// Changes to apply at commit
    pub pending: Mutations,
    /// An exclusive lock is held
    pub locked: bool,
    /// Version the lock replaced, restored on abort
    pub old: Tid,
    /// Write intent of a staged delete; nothing to apply
    pub deleted: bool,
}

impl WriteEntry {
    pub(crate) fn new(key: Key, partition: PartitionId, record: Arc<Record>) -> Self {
        Self {
            key,
            partition,
            record,
            pending: Mutations::new(),
            locked: false,
            old: Tid::ZERO,
            deleted: false,
        }
    }

    /// Apply staged mutations to the record
    pub fn apply(&self) -> Result<()> {
        for m in &self.pending {
            if m.delta {
                self.record.delta_value(m.col, &m.value)?;
            } else {
                self.record.set_value(m.col, m.value.clone())?;
            }
        }
        Ok(())
    }

    /// Column value as this transaction sees it
    pub fn overlay(&self, col: ColumnId) -> Result<Value> {
        overlay(self.record.get_value(col)?, &self.pending, col)
    }
}

/// A record staged for insertion, invisible to others until commit
#[derive(Debug)]
pub struct InsertEntry {
    /// Reserved key
    pub key: Key,
    /// Target partition
    pub partition: PartitionId,
    /// Placeholder record installed by the reservation
    pub record: Arc<Record>,
}

/// A key reserved for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteEntry {
    /// Key to remove at commit
    pub key: Key,
    /// Partition holding the key
    pub partition: PartitionId,
}

/// Apply `pending` changes for `col` on top of `base`
pub fn overlay(base: Value, pending: &[Mutation], col: ColumnId) -> Result<Value> {
    let mut value = base;
    for m in pending.iter().filter(|m| m.col == col) {
        if m.delta {
            value.apply_delta(&m.value)?;
        } else {
            value = m.value.clone();
        }
    }
    Ok(value)
}

fn find<'a, E, F>(entries: &'a [E], matches: F) -> Option<usize>
where
    F: Fn(&'a E) -> bool,
{
    entries.iter().position(matches)
}

/// Tracking vectors for one table
#[derive(Debug, Default)]
pub struct TableTracking {
    /// Writes to partitions running PCC
    pub pcc_writes: Vec<WriteEntry>,
    /// Shared-lock reads under 2PL
    pub lock_reads: Vec<ReadEntry>,
    /// Exclusive-lock writes under 2PL
    pub lock_writes: Vec<WriteEntry>,
    /// Optimistic reads, validated at commit
    pub occ_reads: Vec<ReadEntry>,
    /// Optimistic writes, locked at commit
    pub occ_writes: Vec<WriteEntry>,
    /// Keys reserved for insertion
    pub inserts: Vec<InsertEntry>,
    /// Keys staged for deletion
    pub deletes: Vec<DeleteEntry>,
}

macro_rules! lookup {
    ($name:ident, $field:ident) => {
        #[inline]
        pub fn $name(&self, key: &Key, partition: PartitionId) -> Option<usize> {
            find(&self.$field, |e| e.key == *key && e.partition == partition)
        }
    };
}

impl TableTracking {
    lookup!(pcc_write, pcc_writes);
    lookup!(lock_read, lock_reads);
    lookup!(lock_write, lock_writes);
    lookup!(occ_read, occ_reads);
    lookup!(occ_write, occ_writes);
    lookup!(insert, inserts);
    lookup!(delete, deletes);

    /// Entries across every vector
    pub fn len(&self) -> usize {
        self.pcc_writes.len()
            + self.lock_reads.len()
            + self.lock_writes.len()
            + self.occ_reads.len()
            + self.occ_writes.len()
            + self.inserts.len()
            + self.deletes.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty every vector, keeping capacity
    pub fn clear(&mut self) {
        self.pcc_writes.clear();
        self.lock_reads.clear();
        self.lock_writes.clear();
        self.occ_reads.clear();
        self.occ_writes.clear();
        self.inserts.clear();
        self.deletes.clear();
    }
}

/// Everything a worker tracks for its current transaction
#[derive(Debug)]
pub struct TxnState {
    /// Tracking per table, indexed by [`TableId`]
    pub tables: Vec<TableTracking>,
    /// Largest version seen through OCC
    pub occ_max_seen: Tid,
    /// Largest version seen through 2PL
    pub lock_max_seen: Tid,
    /// PCC partitions whose latch this worker holds
    pub latched: Vec<PartitionId>,
    /// Partitions accessed
    pub touched: SmallVec<[PartitionId; 8]>,
    /// Records read without a tracking entry (PCC reads)
    pub untracked: usize,
    /// Scratch for the OCC lock phase: (key, table, partition, index)
    pub lock_order: Vec<(Key, TableId, PartitionId, usize)>,
}

impl TxnState {
    /// State sized for `tables` tables
    pub fn new(tables: usize) -> Self {
        Self {
            tables: (0..tables).map(|_| TableTracking::default()).collect(),
            occ_max_seen: Tid::ZERO,
            lock_max_seen: Tid::ZERO,
            latched: Vec::new(),
            touched: SmallVec::new(),
            untracked: 0,
            lock_order: Vec::new(),
        }
    }

    /// Note an access to `partition`
    #[inline]
    pub fn touch(&mut self, partition: PartitionId) {
        if !self.touched.contains(&partition) {
            self.touched.push(partition);
        }
    }

    /// Records tracked across every table
    pub fn records(&self) -> usize {
        self.tables.iter().map(TableTracking::len).sum::<usize>() + self.untracked
    }

    /// Reset for the next transaction, keeping capacity; latches are
    /// released by the caller first
    pub fn clear(&mut self) {
        for t in &mut self.tables {
            t.clear();
        }
        self.occ_max_seen = Tid::ZERO;
        self.lock_max_seen = Tid::ZERO;
        self.touched.clear();
        self.untracked = 0;
        self.lock_order.clear();
    }

    /// Whether no transaction state is left over
    pub fn is_clear(&self) -> bool {
        self.tables.iter().all(TableTracking::is_empty) && self.latched.is_empty() && self.touched.is_empty()
    }
}
