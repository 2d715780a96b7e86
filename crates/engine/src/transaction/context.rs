//! Mixed-protocol transaction: read/write dispatch and abort
//!
//! Every access looks up its partition in the routing table captured at
//! begin and takes that protocol's path:
//!
//! | Protocol | Read | Write |
//! |----------|------|-------|
//! | PCC | own write-set, else store | stage in PCC write-set |
//! | 2PL | own write-set, own read-set, else `rlock` | append, `upgrade`, or `wlock` |
//! | OCC | register version, overlay own writes | stage; lock at commit |
//!
//! Conflicts abort the whole transaction before the error is returned, so
//! callers never see a half-unwound transaction.

use super::tracking::{DeleteEntry, InsertEntry, Mutation, ReadEntry, TxnState, WriteEntry};
use crate::manager::EngineShared;
use crate::router::RoutingTable;
use crate::worker::{TidGenerator, WorkerStats};
use adaptcc_concurrency::Waiter;
use adaptcc_core::error::{AbortReason, Error, Result};
use adaptcc_core::protocol::{Protocol, TwoPlPolicy};
use adaptcc_core::tuple::{ColumnId, Tuple};
use adaptcc_core::types::{Key, PartitionId, TableId, Tid, WorkerId};
use adaptcc_core::value::Value;
use adaptcc_storage::{LockArgs, LockSurface, OccSurface, Record};
use std::sync::Arc;
use tracing::{debug, error};

/// Lifecycle of a [`MixedTransaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting operations
    Active,
    /// Committed at `tid`
    Committed {
        /// Commit TID
        tid: Tid,
    },
    /// Unwound; `None` when the caller asked for it
    Aborted {
        /// Conflict that forced the abort
        reason: Option<AbortReason>,
    },
}

/// OCC surface of `record`; a variant without one is a routing bug
pub(super) fn occ_of(record: &Record) -> &dyn OccSurface {
    match record.occ() {
        Ok(surface) => surface,
        Err(misuse) => {
            error!(variant = misuse.variant, surface = misuse.surface, "record routed to wrong protocol");
            misuse.fatal()
        }
    }
}

/// 2PL surface of `record`; a variant without one is a routing bug
pub(super) fn lock_of(record: &Record) -> &dyn LockSurface {
    match record.locking() {
        Ok(surface) => surface,
        Err(misuse) => {
            error!(variant = misuse.variant, surface = misuse.surface, "record routed to wrong protocol");
            misuse.fatal()
        }
    }
}

/// One transaction on one worker
///
/// Borrows the worker's tracking state for its whole life. Dropping an
/// active transaction aborts it.
pub struct MixedTransaction<'w> {
    pub(super) shared: &'w EngineShared,
    pub(super) routes: Arc<RoutingTable>,
    pub(super) state: &'w mut TxnState,
    pub(super) tids: &'w mut TidGenerator,
    pub(super) stats: &'w WorkerStats,
    pub(super) waiter: &'w Waiter,
    pub(super) worker: WorkerId,
    pub(super) start: Tid,
    pub(super) status: TransactionStatus,
}

impl<'w> MixedTransaction<'w> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shared: &'w EngineShared,
        routes: Arc<RoutingTable>,
        state: &'w mut TxnState,
        tids: &'w mut TidGenerator,
        stats: &'w WorkerStats,
        waiter: &'w Waiter,
        worker: WorkerId,
        start: Tid,
    ) -> Self {
        Self {
            shared,
            routes,
            state,
            tids,
            stats,
            waiter,
            worker,
            start,
            status: TransactionStatus::Active,
        }
    }

    /// Start TID; orders wait-die requests
    pub fn start_tid(&self) -> Tid {
        self.start
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Whether operations are still accepted
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Owning worker
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Routing generation this transaction runs under
    pub fn generation(&self) -> u64 {
        self.routes.generation()
    }

    /// Protocol governing `partition` for this transaction
    pub fn protocol(&self, partition: PartitionId) -> Result<Protocol> {
        self.routes.protocol(partition)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read one column
    pub fn read(&mut self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId) -> Result<Value> {
        let protocol = self.route(table, partition)?;

        let t = &self.state.tables[table];
        if let Some(i) = t.insert(key, partition) {
            self.stats.read(true);
            return t.inserts[i].record.get_value(col);
        }
        if t.delete(key, partition).is_some() {
            return Err(self.not_found(table, key));
        }

        match protocol {
            Protocol::Partition => self.read_pcc(table, key, partition, col),
            Protocol::Locking => self.read_locking(table, key, partition, col),
            Protocol::Occ => self.read_occ(table, key, partition, col),
        }
    }

    fn read_pcc(&mut self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId) -> Result<Value> {
        let t = &self.state.tables[table];
        if let Some(i) = t.pcc_write(key, partition) {
            self.stats.read(true);
            return t.pcc_writes[i].overlay(col);
        }
        let record = self.fetch(table, key, partition)?;
        self.state.untracked += 1;
        self.stats.read(false);
        record.get_value(col)
    }

    fn read_locking(&mut self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId) -> Result<Value> {
        let t = &self.state.tables[table];
        if let Some(i) = t.lock_write(key, partition) {
            self.stats.read(true);
            return t.lock_writes[i].overlay(col);
        }
        if let Some(i) = t.lock_read(key, partition) {
            self.stats.read(true);
            return t.lock_reads[i].record.get_value(col);
        }

        let record = self.fetch(table, key, partition)?;
        let args = self.lock_args();
        let surface = lock_of(&record);
        if !surface.rlock(&args) {
            return Err(self.fail(AbortReason::ReadLock));
        }
        let tid = surface.version();
        self.state.lock_max_seen = self.state.lock_max_seen.max(tid);
        let value = record.get_value(col);
        let current = is_current(self.shared, table, key, partition, &record);
        self.state.tables[table].lock_reads.push(ReadEntry {
            key: *key,
            partition,
            record,
            tid,
            exists: true,
        });
        if !current {
            return Err(self.fail(AbortReason::Removed));
        }
        self.stats.read(false);
        value
    }

    fn read_occ(&mut self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId) -> Result<Value> {
        let t = &self.state.tables[table];
        let local = t.occ_read(key, partition).is_some();
        if !local {
            let record = match t.occ_write(key, partition) {
                Some(w) => Arc::clone(&t.occ_writes[w].record),
                None => self.fetch(table, key, partition)?,
            };
            let (unlocked, tid) = occ_of(&record).is_unlocked();
            if !unlocked {
                return Err(self.fail(AbortReason::ReadLocked));
            }
            self.state.occ_max_seen = self.state.occ_max_seen.max(tid);
            self.state.tables[table].occ_reads.push(ReadEntry {
                key: *key,
                partition,
                record,
                tid,
                exists: false,
            });
        }
        self.stats.read(local);

        let t = &self.state.tables[table];
        if let Some(w) = t.occ_write(key, partition) {
            return t.occ_writes[w].overlay(col);
        }
        match t.occ_read(key, partition) {
            Some(r) => t.occ_reads[r].record.get_value(col),
            None => Err(Error::NoSuchKey { table, key: *key }),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Overwrite one column
    pub fn write(&mut self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId, value: Value) -> Result<()> {
        self.stage(table, key, partition, Mutation { col, value, delta: false })
    }

    /// Add `delta` to one column
    pub fn delta(&mut self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId, delta: Value) -> Result<()> {
        self.stage(table, key, partition, Mutation { col, value: delta, delta: true })
    }

    fn stage(&mut self, table: TableId, key: &Key, partition: PartitionId, m: Mutation) -> Result<()> {
        let protocol = self.route(table, partition)?;

        let t = &self.state.tables[table];
        if let Some(i) = t.insert(key, partition) {
            // staged inserts are private until commit
            let record = &t.inserts[i].record;
            record.check_value(m.col, &m.value)?;
            if m.delta {
                record.delta_value(m.col, &m.value)?;
            } else {
                record.set_value(m.col, m.value)?;
            }
            self.stats.wrote(true);
            return Ok(());
        }
        if t.delete(key, partition).is_some() {
            return Err(self.not_found(table, key));
        }

        let local = match protocol {
            Protocol::Partition => {
                let (i, local) = self.pcc_write_entry(table, key, partition, Some(&m))?;
                self.state.tables[table].pcc_writes[i].pending.push(m);
                local
            }
            Protocol::Locking => {
                let (i, local) = self.lock_write_entry(table, key, partition, Some(&m))?;
                self.state.tables[table].lock_writes[i].pending.push(m);
                local
            }
            Protocol::Occ => {
                let (i, local) = self.occ_write_entry(table, key, partition, Some(&m))?;
                self.state.tables[table].occ_writes[i].pending.push(m);
                local
            }
        };
        self.stats.wrote(local);
        Ok(())
    }

    fn pcc_write_entry(
        &mut self,
        table: TableId,
        key: &Key,
        partition: PartitionId,
        check: Option<&Mutation>,
    ) -> Result<(usize, bool)> {
        let t = &self.state.tables[table];
        if let Some(i) = t.pcc_write(key, partition) {
            check_against(&t.pcc_writes[i].record, check)?;
            return Ok((i, true));
        }
        let record = self.fetch(table, key, partition)?;
        check_against(&record, check)?;
        let writes = &mut self.state.tables[table].pcc_writes;
        writes.push(WriteEntry::new(*key, partition, record));
        Ok((writes.len() - 1, false))
    }

    /// Exclusive 2PL hold on `key`: reuse, upgrade, or acquire
    fn lock_write_entry(
        &mut self,
        table: TableId,
        key: &Key,
        partition: PartitionId,
        check: Option<&Mutation>,
    ) -> Result<(usize, bool)> {
        let t = &self.state.tables[table];
        if let Some(i) = t.lock_write(key, partition) {
            check_against(&t.lock_writes[i].record, check)?;
            return Ok((i, true));
        }

        let args = self.lock_args();
        if let Some(r) = t.lock_read(key, partition) {
            let record = Arc::clone(&t.lock_reads[r].record);
            check_against(&record, check)?;
            let surface = lock_of(&record);
            let upgraded = surface.upgrade(&args);
            // the shared hold is gone whether or not the upgrade took
            self.state.tables[table].lock_reads[r].exists = false;
            if !upgraded {
                return Err(self.fail(AbortReason::Upgrade));
            }
            let old = surface.version();
            return Ok((self.push_lock_write(table, key, partition, record, old), true));
        }

        let record = self.fetch(table, key, partition)?;
        check_against(&record, check)?;
        let surface = lock_of(&record);
        if !surface.wlock(&args) {
            return Err(self.fail(AbortReason::WriteLock));
        }
        let old = surface.version();
        let current = is_current(self.shared, table, key, partition, &record);
        let i = self.push_lock_write(table, key, partition, record, old);
        if !current {
            return Err(self.fail(AbortReason::Removed));
        }
        Ok((i, false))
    }

    fn push_lock_write(&mut self, table: TableId, key: &Key, partition: PartitionId, record: Arc<Record>, old: Tid) -> usize {
        self.state.lock_max_seen = self.state.lock_max_seen.max(old);
        let mut entry = WriteEntry::new(*key, partition, record);
        entry.locked = true;
        entry.old = old;
        let writes = &mut self.state.tables[table].lock_writes;
        writes.push(entry);
        writes.len() - 1
    }

    fn occ_write_entry(
        &mut self,
        table: TableId,
        key: &Key,
        partition: PartitionId,
        check: Option<&Mutation>,
    ) -> Result<(usize, bool)> {
        let t = &self.state.tables[table];
        if let Some(i) = t.occ_write(key, partition) {
            check_against(&t.occ_writes[i].record, check)?;
            return Ok((i, true));
        }
        let (record, local) = match t.occ_read(key, partition) {
            Some(r) => (Arc::clone(&t.occ_reads[r].record), true),
            None => (self.fetch(table, key, partition)?, false),
        };
        check_against(&record, check)?;
        // misrouted records fail here rather than at commit
        occ_of(&record);
        let writes = &mut self.state.tables[table].occ_writes;
        writes.push(WriteEntry::new(*key, partition, record));
        Ok((writes.len() - 1, local))
    }

    // ------------------------------------------------------------------
    // Inserts and deletes
    // ------------------------------------------------------------------

    /// Stage a new record
    ///
    /// The key is reserved in the store at once; the record becomes
    /// visible at commit.
    pub fn insert(&mut self, table: TableId, key: Key, partition: PartitionId, tuple: Box<dyn Tuple>) -> Result<()> {
        self.route(table, partition)?;
        if self.state.tables[table].insert(&key, partition).is_some() {
            return Err(Error::DuplicateKey { table, key });
        }
        match self.shared.store.prepare_insert(table, &key, partition) {
            Ok(()) => {}
            Err(Error::Conflict(reason)) => return Err(self.fail(reason)),
            Err(e) => return Err(e),
        }
        let record = Arc::new(self.shared.store.new_record(key, tuple));
        self.state.tables[table].inserts.push(InsertEntry { key, partition, record });
        self.stats.wrote(false);
        Ok(())
    }

    /// Stage removal of a record
    ///
    /// Reserves the key and takes a write intent under the partition's
    /// protocol, so concurrent readers conflict with the delete.
    pub fn delete(&mut self, table: TableId, key: &Key, partition: PartitionId) -> Result<()> {
        let protocol = self.route(table, partition)?;

        let t = &mut self.state.tables[table];
        if let Some(i) = t.insert(key, partition) {
            let staged = t.inserts.swap_remove(i);
            self.shared.store.release_insert(table, &staged.key, staged.partition);
            self.stats.wrote(true);
            return Ok(());
        }
        if t.delete(key, partition).is_some() {
            return Err(self.not_found(table, key));
        }

        match self.shared.store.prepare_delete(table, key, partition) {
            Ok(()) => {}
            Err(Error::Conflict(reason)) => return Err(self.fail(reason)),
            Err(e) => {
                if e.is_not_found() {
                    self.stats.not_found();
                }
                return Err(e);
            }
        }
        self.state.tables[table].deletes.push(DeleteEntry { key: *key, partition });

        match protocol {
            Protocol::Partition => {
                let t = &mut self.state.tables[table];
                if let Some(i) = t.pcc_write(key, partition) {
                    t.pcc_writes[i].deleted = true;
                }
            }
            Protocol::Locking => {
                let (i, _) = self.lock_write_entry(table, key, partition, None)?;
                self.state.tables[table].lock_writes[i].deleted = true;
            }
            Protocol::Occ => {
                let (i, _) = self.occ_write_entry(table, key, partition, None)?;
                self.state.tables[table].occ_writes[i].deleted = true;
            }
        }
        self.stats.wrote(false);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Abort
    // ------------------------------------------------------------------

    /// Unwind everything and end the transaction
    pub fn abort(mut self) {
        self.abort_with(None);
    }

    /// Release every held lock and reservation, then reset the worker's
    /// tracking state. Safe to call more than once.
    pub(super) fn abort_with(&mut self, reason: Option<AbortReason>) {
        if !self.is_active() {
            return;
        }
        let args = self.lock_args();
        let store = &self.shared.store;
        for (table, t) in self.state.tables.iter_mut().enumerate() {
            for r in t.lock_reads.iter_mut().filter(|r| r.exists) {
                lock_of(&r.record).runlock(&args);
                r.exists = false;
            }
            for w in t.lock_writes.iter_mut().filter(|w| w.locked) {
                lock_of(&w.record).wunlock(&args, None);
                w.locked = false;
            }
            for w in t.occ_writes.iter_mut().filter(|w| w.locked) {
                occ_of(&w.record).unlock(w.old);
                w.locked = false;
            }
            for i in &t.inserts {
                store.release_insert(table, &i.key, i.partition);
            }
            for d in &t.deletes {
                store.release_delete(table, &d.key, d.partition);
            }
        }

        match reason {
            Some(r) => {
                self.stats.aborted(r);
                debug!(worker = self.worker, reason = %r, tid = %self.start, "transaction aborted");
            }
            None => debug!(worker = self.worker, reason = "requested", tid = %self.start, "transaction aborted"),
        }
        self.status = TransactionStatus::Aborted { reason };
        self.finish();
    }

    /// Abort on `reason` and hand back the error to return
    pub(super) fn fail(&mut self, reason: AbortReason) -> Error {
        self.abort_with(Some(reason));
        Error::Conflict(reason)
    }

    /// Release latches, clear tracking, leave the epoch gate
    pub(super) fn finish(&mut self) {
        self.stats.footprint(self.state.touched.len(), self.state.records());
        for p in self.state.latched.drain(..) {
            if let Ok(latch) = self.shared.store.partition_latch(p) {
                latch.unlock();
            }
        }
        self.state.clear();
        self.shared.router.exit();
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Check the transaction is open and the table exists, note the
    /// partition, and return its protocol
    fn route(&mut self, table: TableId, partition: PartitionId) -> Result<Protocol> {
        if !self.is_active() {
            return Err(Error::TransactionClosed);
        }
        if table >= self.state.tables.len() {
            return Err(Error::UnknownTable(table));
        }
        let protocol = self.routes.protocol(partition)?;
        self.state.touch(partition);
        Ok(protocol)
    }

    pub(super) fn lock_args(&self) -> LockArgs<'w> {
        let config = &self.shared.config;
        LockArgs {
            policy: config.two_pl_policy,
            trial: config.lock_trial,
            tid: self.start,
            waiter: (config.two_pl_policy == TwoPlPolicy::WaitDie).then_some(self.waiter),
        }
    }

    fn fetch(&self, table: TableId, key: &Key, partition: PartitionId) -> Result<Arc<Record>> {
        self.shared.store.get_record(table, key, partition).map_err(|e| {
            if e.is_not_found() {
                self.stats.not_found();
            }
            e
        })
    }

    fn not_found(&self, table: TableId, key: &Key) -> Error {
        self.stats.not_found();
        Error::NoSuchKey { table, key: *key }
    }
}

/// Whether `record` is still the store's copy of `key`
///
/// A lock granted after a concurrent delete committed lands on a record
/// that is no longer reachable.
pub(super) fn is_current(
    shared: &EngineShared,
    table: TableId,
    key: &Key,
    partition: PartitionId,
    record: &Arc<Record>,
) -> bool {
    matches!(shared.store.get_record(table, key, partition), Ok(live) if Arc::ptr_eq(&live, record))
}

fn check_against(record: &Record, check: Option<&Mutation>) -> Result<()> {
    match check {
        Some(m) => record.check_value(m.col, &m.value),
        None => Ok(()),
    }
}

impl Drop for MixedTransaction<'_> {
    fn drop(&mut self) {
        self.abort_with(None);
    }
}

impl std::fmt::Debug for MixedTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedTransaction")
            .field("worker", &self.worker)
            .field("start", &self.start)
            .field("generation", &self.routes.generation())
            .field("status", &self.status)
            .finish()
    }
}
