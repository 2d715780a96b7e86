//! Per-thread transaction driver
//!
//! A [`Worker`] owns everything a transaction needs that is not shared:
//! the TID counter, the tracking vectors (reused across transactions), the
//! wait-die completion channel, and its statistics block.

use crate::manager::EngineShared;
use crate::transaction::{MixedTransaction, TxnState};
use adaptcc_concurrency::{CacheAligned, Waiter};
use adaptcc_core::error::{AbortReason, Error, Result};
use adaptcc_core::protocol::Protocol;
use adaptcc_core::types::{PartitionId, Tid, WorkerId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Monotonic TID source for one worker
#[derive(Debug, Clone)]
pub struct TidGenerator {
    worker: WorkerId,
    next: u64,
}

impl TidGenerator {
    /// Counter starts at 1 so no transaction ever draws [`Tid::ZERO`]
    pub fn new(worker: WorkerId) -> Self {
        Self::resume(worker, 1)
    }

    /// Continue from counter `next`, where an earlier holder of the id
    /// stopped
    pub fn resume(worker: WorkerId, next: u64) -> Self {
        Self { worker, next: next.max(1) }
    }

    /// Draw a fresh TID
    pub fn next(&mut self) -> Tid {
        let tid = Tid::compose(self.next, self.worker);
        self.next += 1;
        tid
    }

    /// Make the next draw strictly greater than `observed`
    pub fn advance_past(&mut self, observed: Tid) {
        let floor = observed.counter() + 1;
        if floor > self.next {
            self.next = floor;
        }
    }

    /// Counter value of the next draw
    pub fn peek(&self) -> u64 {
        self.next
    }
}

#[derive(Debug, Default)]
struct Counters {
    txns: AtomicU64,
    commits: AtomicU64,
    aborts: [AtomicU64; AbortReason::COUNT],
    not_found: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    local_hits: AtomicU64,
    cross_partition: AtomicU64,
    partitions_sum: AtomicU64,
    partitions_sq_sum: AtomicU64,
    records_sum: AtomicU64,
    records_sq_sum: AtomicU64,
}

/// Counters written by one worker, read by the stats collector
#[derive(Debug, Default)]
pub struct WorkerStats {
    counters: CacheAligned<Counters>,
}

impl WorkerStats {
    #[inline]
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn begun(&self) {
        Self::bump(&self.counters.txns, 1);
    }

    pub(crate) fn committed(&self) {
        Self::bump(&self.counters.commits, 1);
    }

    pub(crate) fn aborted(&self, reason: AbortReason) {
        Self::bump(&self.counters.aborts[reason.index()], 1);
    }

    pub(crate) fn not_found(&self) {
        Self::bump(&self.counters.not_found, 1);
    }

    pub(crate) fn read(&self, local: bool) {
        Self::bump(&self.counters.reads, 1);
        if local {
            Self::bump(&self.counters.local_hits, 1);
        }
    }

    pub(crate) fn wrote(&self, local: bool) {
        Self::bump(&self.counters.writes, 1);
        if local {
            Self::bump(&self.counters.local_hits, 1);
        }
    }

    /// Shape of a finished transaction
    pub(crate) fn footprint(&self, partitions: usize, records: usize) {
        let (p, r) = (partitions as u64, records as u64);
        if p > 1 {
            Self::bump(&self.counters.cross_partition, 1);
        }
        Self::bump(&self.counters.partitions_sum, p);
        Self::bump(&self.counters.partitions_sq_sum, p * p);
        Self::bump(&self.counters.records_sum, r);
        Self::bump(&self.counters.records_sq_sum, r * r);
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        let mut aborts = [0u64; AbortReason::COUNT];
        for (slot, counter) in aborts.iter_mut().zip(c.aborts.iter()) {
            *slot = load(counter);
        }
        StatsSnapshot {
            txns: load(&c.txns),
            commits: load(&c.commits),
            aborts,
            not_found: load(&c.not_found),
            reads: load(&c.reads),
            writes: load(&c.writes),
            local_hits: load(&c.local_hits),
            cross_partition: load(&c.cross_partition),
            partitions_sum: load(&c.partitions_sum),
            partitions_sq_sum: load(&c.partitions_sq_sum),
            records_sum: load(&c.records_sum),
            records_sq_sum: load(&c.records_sq_sum),
        }
    }
}

/// Plain copy of [`WorkerStats`], summable across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Transactions begun
    pub txns: u64,
    /// Transactions committed
    pub commits: u64,
    /// Aborts, indexed by [`AbortReason::index`]
    pub aborts: [u64; AbortReason::COUNT],
    /// `NoSuchKey` results
    pub not_found: u64,
    /// Column reads
    pub reads: u64,
    /// Column writes
    pub writes: u64,
    /// Accesses served from the transaction's own sets
    pub local_hits: u64,
    /// Transactions touching more than one partition
    pub cross_partition: u64,
    /// Sum of partitions touched
    pub partitions_sum: u64,
    /// Sum of squared partitions touched
    pub partitions_sq_sum: u64,
    /// Sum of records touched
    pub records_sum: u64,
    /// Sum of squared records touched
    pub records_sq_sum: u64,
}

impl StatsSnapshot {
    /// Add `other` into `self`
    pub fn merge(&mut self, other: &StatsSnapshot) {
        self.txns += other.txns;
        self.commits += other.commits;
        for (a, b) in self.aborts.iter_mut().zip(other.aborts.iter()) {
            *a += b;
        }
        self.not_found += other.not_found;
        self.reads += other.reads;
        self.writes += other.writes;
        self.local_hits += other.local_hits;
        self.cross_partition += other.cross_partition;
        self.partitions_sum += other.partitions_sum;
        self.partitions_sq_sum += other.partitions_sq_sum;
        self.records_sum += other.records_sum;
        self.records_sq_sum += other.records_sq_sum;
    }

    /// Counters accumulated since `base` was taken
    pub fn since(&self, base: &StatsSnapshot) -> StatsSnapshot {
        let mut aborts = [0u64; AbortReason::COUNT];
        for (out, (now, then)) in aborts.iter_mut().zip(self.aborts.iter().zip(base.aborts.iter())) {
            *out = now.saturating_sub(*then);
        }
        StatsSnapshot {
            txns: self.txns.saturating_sub(base.txns),
            commits: self.commits.saturating_sub(base.commits),
            aborts,
            not_found: self.not_found.saturating_sub(base.not_found),
            reads: self.reads.saturating_sub(base.reads),
            writes: self.writes.saturating_sub(base.writes),
            local_hits: self.local_hits.saturating_sub(base.local_hits),
            cross_partition: self.cross_partition.saturating_sub(base.cross_partition),
            partitions_sum: self.partitions_sum.saturating_sub(base.partitions_sum),
            partitions_sq_sum: self.partitions_sq_sum.saturating_sub(base.partitions_sq_sum),
            records_sum: self.records_sum.saturating_sub(base.records_sum),
            records_sq_sum: self.records_sq_sum.saturating_sub(base.records_sq_sum),
        }
    }

    /// Aborts for one reason
    pub fn aborts_for(&self, reason: AbortReason) -> u64 {
        self.aborts[reason.index()]
    }

    /// Aborts for every reason
    pub fn total_aborts(&self) -> u64 {
        self.aborts.iter().sum()
    }

    /// Aborts per transaction begun
    pub fn conflict_rate(&self) -> f64 {
        if self.txns == 0 {
            0.0
        } else {
            self.total_aborts() as f64 / self.txns as f64
        }
    }
}

/// One transaction-executing thread's private state
pub struct Worker {
    id: WorkerId,
    shared: Arc<EngineShared>,
    tids: TidGenerator,
    stats: Arc<WorkerStats>,
    state: TxnState,
    waiter: Waiter,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, shared: Arc<EngineShared>, stats: Arc<WorkerStats>, next_tid: u64) -> Self {
        let waiter = Waiter::new(shared.config.wait_die_timeout());
        let tables = shared.config.tables;
        Self {
            id,
            shared,
            tids: TidGenerator::resume(id, next_tid),
            stats,
            state: TxnState::new(tables),
            waiter,
        }
    }

    /// Worker id
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// This worker's counters
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Start a transaction; the caller owns every PCC partition it touches
    pub fn begin(&mut self) -> Result<MixedTransaction<'_>> {
        self.begin_on(&[])
    }

    /// Start a transaction, latching the listed partitions that run PCC
    ///
    /// Latches are taken in ascending partition order and held until the
    /// transaction ends.
    pub fn begin_on(&mut self, partitions: &[PartitionId]) -> Result<MixedTransaction<'_>> {
        let routes = self.shared.router.enter();

        let mut wanted: Vec<PartitionId> = partitions.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        for p in wanted {
            let latch = match routes.protocol(p).and_then(|proto| {
                if proto == Protocol::Partition {
                    self.shared.store.partition_latch(p).map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(latch) => latch,
                Err(e) => {
                    for held in self.state.latched.drain(..) {
                        if let Ok(latch) = self.shared.store.partition_latch(held) {
                            latch.unlock();
                        }
                    }
                    self.shared.router.exit();
                    return Err(e);
                }
            };
            if let Some(latch) = latch {
                latch.lock();
                self.state.latched.push(p);
            }
        }

        let start = self.tids.next();
        self.stats.begun();
        Ok(MixedTransaction::new(
            &self.shared,
            routes,
            &mut self.state,
            &mut self.tids,
            &self.stats,
            &self.waiter,
            self.id,
            start,
        ))
    }

    /// Run `f` in a transaction, retrying on conflict
    pub fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnMut(&mut MixedTransaction<'_>) -> Result<T>,
    {
        self.run_on(&[], f)
    }

    /// [`Worker::run`] with PCC partition latching
    ///
    /// Gives up with `RetriesExhausted` after `max_retries` conflicts.
    /// Non-conflict errors are returned at once.
    pub fn run_on<T, F>(&mut self, partitions: &[PartitionId], mut f: F) -> Result<T>
    where
        F: FnMut(&mut MixedTransaction<'_>) -> Result<T>,
    {
        let budget = self.shared.config.max_retries;
        let mut last = AbortReason::ReadChanged;
        for _ in 0..budget {
            let mut txn = self.begin_on(partitions)?;
            let outcome = match f(&mut txn) {
                Ok(value) => txn.commit().map(|_| value),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(Error::Conflict(reason)) => last = reason,
                Err(e) => return Err(e),
            }
        }
        warn!(worker = self.id, attempts = budget, last = %last, "retry budget exhausted");
        Err(Error::RetriesExhausted { attempts: budget, last })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shared.workers.lock().retire(self.id, self.tids.peek());
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("next_tid", &self.tids.peek())
            .finish()
    }
}
