//! Commit protocol
//!
//! ```text
//! 1. lock OCC write-set      sorted by (key, table, partition), each
//!                            record still in the store
//! 2. draw commit TID         > every version observed
//! 3. validate OCC read-set   version unchanged, no foreign lock
//! 4. apply, tables reversed  inserts/deletes, then values, then unlock
//! ```
//!
//! Any failure before step 4 aborts; step 4 cannot fail.

use super::context::{is_current, lock_of, occ_of, MixedTransaction, TransactionStatus};
use super::tracking::WriteEntry;
use adaptcc_concurrency::Backoff;
use adaptcc_core::error::{AbortReason, Error, Result};
use adaptcc_core::protocol::OccLockPolicy;
use adaptcc_core::types::{TableId, Tid};
use std::sync::Arc;
use tracing::{error, trace};

impl<'w> MixedTransaction<'w> {
    /// Commit and return the commit TID
    ///
    /// Returns `Conflict` (after aborting) if an OCC write lock cannot be
    /// taken under the no-wait policy or if validation fails.
    pub fn commit(mut self) -> Result<Tid> {
        if !self.is_active() {
            return Err(Error::TransactionClosed);
        }
        self.lock_occ_writes()?;
        let tid = self.commit_tid();
        self.validate_occ_reads()?;
        self.apply(tid);

        self.stats.committed();
        self.status = TransactionStatus::Committed { tid };
        trace!(worker = self.worker, tid = %tid, "transaction committed");
        self.finish();
        Ok(tid)
    }

    fn lock_occ_writes(&mut self) -> Result<()> {
        let config = &self.shared.config;
        let (policy, trial, spin) = (config.occ_lock_policy, config.lock_trial, config.spin_trial);

        let shared = self.shared;

        let mut order = std::mem::take(&mut self.state.lock_order);
        for (table, t) in self.state.tables.iter().enumerate() {
            order.extend(t.occ_writes.iter().enumerate().map(|(i, w)| (w.key, table, w.partition, i)));
        }
        order.sort_unstable();

        let mut failed = None;
        for &(_, table, _, i) in &order {
            let entry = &mut self.state.tables[table].occ_writes[i];
            let mut backoff = Backoff::new(spin);
            let taken = loop {
                let (ok, seen) = occ_of(&entry.record).lock(trial);
                if ok {
                    break Some(seen);
                }
                match policy {
                    OccLockPolicy::NoWait => break None,
                    OccLockPolicy::Wait => backoff.snooze(),
                }
            };
            match taken {
                Some(old) => {
                    entry.locked = true;
                    entry.old = old;
                    self.state.occ_max_seen = self.state.occ_max_seen.max(old);
                    if !is_current(shared, table, &entry.key, entry.partition, &entry.record) {
                        failed = Some(AbortReason::Removed);
                        break;
                    }
                }
                None => {
                    failed = Some(AbortReason::CommitLock);
                    break;
                }
            }
        }
        order.clear();
        self.state.lock_order = order;

        match failed {
            Some(reason) => Err(self.fail(reason)),
            None => Ok(()),
        }
    }

    fn commit_tid(&mut self) -> Tid {
        let seen = self.state.occ_max_seen.max(self.state.lock_max_seen);
        let mut tid = self.tids.next();
        if tid <= seen {
            self.tids.advance_past(seen);
            tid = self.tids.next();
        }
        tid
    }

    fn validate_occ_reads(&mut self) -> Result<()> {
        let mut violation = None;
        'tables: for t in &self.state.tables {
            for r in &t.occ_reads {
                let (unlocked, current) = occ_of(&r.record).is_unlocked();
                if current != r.tid {
                    violation = Some(AbortReason::ReadChanged);
                    break 'tables;
                }
                let ours = t
                    .occ_writes
                    .iter()
                    .any(|w| w.locked && w.key == r.key && w.partition == r.partition);
                if !unlocked && !ours {
                    violation = Some(AbortReason::ReadWriteConflict);
                    break 'tables;
                }
            }
        }
        match violation {
            Some(reason) => Err(self.fail(reason)),
            None => Ok(()),
        }
    }

    fn apply(&mut self, tid: Tid) {
        let args = self.lock_args();
        let store = &self.shared.store;
        let worker = self.worker;

        for (table, t) in self.state.tables.iter_mut().enumerate().rev() {
            if !t.inserts.is_empty() {
                let batch = t
                    .inserts
                    .iter()
                    .map(|e| {
                        e.record.stamp(tid);
                        (e.partition, Arc::clone(&e.record))
                    })
                    .collect();
                if let Err(e) = store.insert_records(table, batch) {
                    error!(worker, table, error = %e, "publishing inserts failed after commit point");
                }
            }
            for d in &t.deletes {
                if let Err(e) = store.delete_record(table, &d.key, d.partition) {
                    error!(worker, table, key = %d.key, error = %e, "delete failed after commit point");
                }
            }

            for w in &t.pcc_writes {
                apply_entry(worker, table, w);
            }
            for w in &mut t.lock_writes {
                apply_entry(worker, table, w);
                lock_of(&w.record).wunlock(&args, Some(tid));
                w.locked = false;
            }
            for r in t.lock_reads.iter_mut().filter(|r| r.exists) {
                lock_of(&r.record).runlock(&args);
                r.exists = false;
            }
            for w in &mut t.occ_writes {
                apply_entry(worker, table, w);
                occ_of(&w.record).unlock(tid);
                w.locked = false;
            }
        }
    }
}

fn apply_entry(worker: usize, table: TableId, entry: &WriteEntry) {
    if entry.deleted {
        return;
    }
    if let Err(e) = entry.apply() {
        error!(worker, table, key = %entry.key, error = %e, "staged write failed after commit point");
    }
}
