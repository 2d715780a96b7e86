//! Record model
//!
//! A [`Record`] is a key plus a tuple plus whatever concurrency metadata
//! its protocol needs:
//!
//! | Variant | Metadata | Surfaces |
//! |---------|----------|----------|
//! | `Partition` | none | [`RecordAccess`] |
//! | `Occ` | versioned mutex | + [`OccSurface`] |
//! | `Locking` | bounded RW spinlock + wait-die lock | + [`LockSurface`] |
//! | `Adaptive` | versioned mutex + bounded RW spinlock | + both |
//!
//! Asking a record for a surface it does not have yields a
//! [`ProtocolMisuse`]: the router sent the record down the wrong path.
//!
//! ## Adaptive records
//!
//! The same physical record may be read under OCC by one transaction and
//! locked under 2PL by another, across an epoch switch. The two disciplines
//! stay coherent through these rules:
//!
//! - `is_unlocked` reports locked if either the version word or the RW
//!   spinlock is write-held.
//! - OCC `lock` takes the version word, then the RW spinlock exclusively;
//!   it backs out the version word if the second step fails.
//! - 2PL `rlock` refuses while the version word is locked.
//! - 2PL `wlock`/`upgrade` take the version word as well, so OCC readers
//!   see 2PL writers.
//! - 2PL `wunlock(Some(tid))` publishes `tid`; `wunlock(None)` restores the
//!   previous version.

use adaptcc_concurrency::{
    CacheAligned, LockMode, VersionedMutex, WaitDieLock, Waiter, WdRwSpinlock,
};
use adaptcc_core::error::{ProtocolMisuse, Result};
use adaptcc_core::protocol::{SystemMode, TwoPlPolicy};
use adaptcc_core::tuple::{ColumnId, Tuple};
use adaptcc_core::types::{Key, Tid};
use adaptcc_core::value::Value;
use parking_lot::RwLock;

/// Column access shared by every record variant
pub trait RecordAccess: Send + Sync {
    /// The record's key
    fn key(&self) -> Key;

    /// Read one column
    fn get_value(&self, col: ColumnId) -> Result<Value>;

    /// Overwrite one column
    fn set_value(&self, col: ColumnId, value: Value) -> Result<()>;

    /// Add to one column in place
    fn delta_value(&self, col: ColumnId, delta: &Value) -> Result<()>;

    /// Whether `value` could be written to column `col`
    fn check_value(&self, col: ColumnId, value: &Value) -> Result<()>;

    /// Copy of every column
    fn snapshot(&self) -> Vec<Value>;
}

/// OCC concurrency surface
pub trait OccSurface: RecordAccess {
    /// Single attempt at the commit-time write lock. `trial` bounds any
    /// secondary lock the variant must also take.
    fn lock(&self, trial: u32) -> (bool, Tid);

    /// Publish `tid` and release the write lock
    fn unlock(&self, tid: Tid);

    /// Non-blocking snapshot: `(unlocked, version)`
    fn is_unlocked(&self) -> (bool, Tid);
}

/// How a 2PL lock call should behave
#[derive(Debug, Clone, Copy)]
pub struct LockArgs<'a> {
    /// Acquisition discipline
    pub policy: TwoPlPolicy,
    /// Attempts for bounded spinlocks
    pub trial: u32,
    /// Requesting transaction's start TID (wait-die age)
    pub tid: Tid,
    /// Completion channel; `None` means never queue
    pub waiter: Option<&'a Waiter>,
}

impl<'a> LockArgs<'a> {
    /// Bounded-spin arguments
    pub fn spin(trial: u32) -> Self {
        Self { policy: TwoPlPolicy::BoundedSpin, trial, tid: Tid::ZERO, waiter: None }
    }
}

/// 2PL concurrency surface
pub trait LockSurface: RecordAccess {
    /// Acquire shared
    fn rlock(&self, args: &LockArgs<'_>) -> bool;

    /// Release shared
    fn runlock(&self, args: &LockArgs<'_>);

    /// Acquire exclusive
    fn wlock(&self, args: &LockArgs<'_>) -> bool;

    /// Release exclusive. `Some(tid)` publishes a commit version where the
    /// variant keeps one; `None` means the writes were abandoned.
    fn wunlock(&self, args: &LockArgs<'_>, commit: Option<Tid>);

    /// Shared to exclusive. On failure the shared hold is gone as well.
    fn upgrade(&self, args: &LockArgs<'_>) -> bool;

    /// Last published version, `Tid::ZERO` for variants without one
    fn version(&self) -> Tid;
}

/// Key plus latched tuple, common to all variants
struct TupleCell {
    key: Key,
    tuple: RwLock<Box<dyn Tuple>>,
}

impl TupleCell {
    fn new(key: Key, tuple: Box<dyn Tuple>) -> Self {
        Self { key, tuple: RwLock::new(tuple) }
    }
}

impl std::fmt::Debug for TupleCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TupleCell").field("key", &self.key).finish_non_exhaustive()
    }
}

macro_rules! impl_record_access {
    ($($ty:ty),+) => {$(
        impl RecordAccess for $ty {
            fn key(&self) -> Key {
                self.cell.key
            }

            fn get_value(&self, col: ColumnId) -> Result<Value> {
                self.cell.tuple.read().get_value(col)
            }

            fn set_value(&self, col: ColumnId, value: Value) -> Result<()> {
                self.cell.tuple.write().set_value(col, value)
            }

            fn delta_value(&self, col: ColumnId, delta: &Value) -> Result<()> {
                self.cell.tuple.write().delta_value(col, delta)
            }

            fn check_value(&self, col: ColumnId, value: &Value) -> Result<()> {
                self.cell.tuple.read().check_value(col, value)
            }

            fn snapshot(&self) -> Vec<Value> {
                self.cell.tuple.read().snapshot()
            }
        }
    )+};
}

/// PCC record: no lock, the owning worker is the only accessor
#[derive(Debug)]
pub struct PartitionRecord {
    cell: TupleCell,
}

/// OCC record
#[derive(Debug)]
pub struct OccRecord {
    cell: TupleCell,
    word: CacheAligned<VersionedMutex>,
}

/// 2PL record
#[derive(Debug)]
pub struct LockingRecord {
    cell: TupleCell,
    rw: CacheAligned<WdRwSpinlock>,
    wd: WaitDieLock,
}

/// Record that serves OCC and 2PL at once
#[derive(Debug)]
pub struct AdaptiveRecord {
    cell: TupleCell,
    word: CacheAligned<VersionedMutex>,
    rw: WdRwSpinlock,
}

impl_record_access!(PartitionRecord, OccRecord, LockingRecord, AdaptiveRecord);

impl OccSurface for OccRecord {
    fn lock(&self, _trial: u32) -> (bool, Tid) {
        self.word.lock()
    }

    fn unlock(&self, tid: Tid) {
        self.word.unlock(tid)
    }

    fn is_unlocked(&self) -> (bool, Tid) {
        self.word.is_unlocked()
    }
}

impl LockSurface for LockingRecord {
    fn rlock(&self, args: &LockArgs<'_>) -> bool {
        match args.policy {
            TwoPlPolicy::BoundedSpin => self.rw.rlock(args.trial),
            TwoPlPolicy::WaitDie | TwoPlPolicy::NoWait => {
                self.wd.acquire(args.tid, LockMode::Shared, args.waiter)
            }
        }
    }

    fn runlock(&self, args: &LockArgs<'_>) {
        match args.policy {
            TwoPlPolicy::BoundedSpin => self.rw.runlock(),
            TwoPlPolicy::WaitDie | TwoPlPolicy::NoWait => self.wd.unlock(args.tid),
        }
    }

    fn wlock(&self, args: &LockArgs<'_>) -> bool {
        match args.policy {
            TwoPlPolicy::BoundedSpin => self.rw.lock(args.trial),
            TwoPlPolicy::WaitDie | TwoPlPolicy::NoWait => {
                self.wd.acquire(args.tid, LockMode::Exclusive, args.waiter)
            }
        }
    }

    fn wunlock(&self, args: &LockArgs<'_>, _commit: Option<Tid>) {
        match args.policy {
            TwoPlPolicy::BoundedSpin => self.rw.unlock(),
            TwoPlPolicy::WaitDie | TwoPlPolicy::NoWait => self.wd.unlock(args.tid),
        }
    }

    fn upgrade(&self, args: &LockArgs<'_>) -> bool {
        match args.policy {
            TwoPlPolicy::BoundedSpin => self.rw.upgrade(args.trial),
            TwoPlPolicy::WaitDie | TwoPlPolicy::NoWait => {
                if self.wd.acquire(args.tid, LockMode::Exclusive, args.waiter) {
                    true
                } else {
                    self.wd.unlock(args.tid);
                    false
                }
            }
        }
    }

    fn version(&self) -> Tid {
        Tid::ZERO
    }
}

impl OccSurface for AdaptiveRecord {
    fn lock(&self, trial: u32) -> (bool, Tid) {
        let (ok, seen) = self.word.lock();
        if !ok {
            return (false, seen);
        }
        if !self.rw.lock(trial) {
            self.word.unlock(seen);
            return (false, seen);
        }
        (true, seen)
    }

    fn unlock(&self, tid: Tid) {
        self.rw.unlock();
        self.word.unlock(tid);
    }

    fn is_unlocked(&self) -> (bool, Tid) {
        let (free, tid) = self.word.is_unlocked();
        (free && !self.rw.is_write_locked(), tid)
    }
}

impl LockSurface for AdaptiveRecord {
    // Adaptive records always lock through the bounded spinlock; the
    // wait-die manager only serves pure 2PL mode.
    fn rlock(&self, args: &LockArgs<'_>) -> bool {
        if self.word.is_locked() {
            return false;
        }
        self.rw.rlock(args.trial)
    }

    fn runlock(&self, _args: &LockArgs<'_>) {
        self.rw.runlock()
    }

    fn wlock(&self, args: &LockArgs<'_>) -> bool {
        if !self.rw.lock(args.trial) {
            return false;
        }
        if !self.word.lock().0 {
            self.rw.unlock();
            return false;
        }
        true
    }

    fn wunlock(&self, _args: &LockArgs<'_>, commit: Option<Tid>) {
        let tid = commit.unwrap_or_else(|| self.word.version());
        self.word.unlock(tid);
        self.rw.unlock();
    }

    fn upgrade(&self, args: &LockArgs<'_>) -> bool {
        if !self.rw.upgrade(args.trial) {
            return false;
        }
        if !self.word.lock().0 {
            self.rw.unlock();
            return false;
        }
        true
    }

    fn version(&self) -> Tid {
        self.word.version()
    }
}

/// A stored record of any variant
#[derive(Debug)]
pub enum Record {
    /// PCC
    Partition(PartitionRecord),
    /// OCC
    Occ(OccRecord),
    /// 2PL
    Locking(LockingRecord),
    /// OCC + 2PL
    Adaptive(AdaptiveRecord),
}

impl Record {
    /// Build the variant `mode` calls for
    pub fn new(mode: SystemMode, key: Key, tuple: Box<dyn Tuple>) -> Self {
        let cell = TupleCell::new(key, tuple);
        match mode {
            SystemMode::Partition => Record::Partition(PartitionRecord { cell }),
            SystemMode::Occ => Record::Occ(OccRecord {
                cell,
                word: CacheAligned::new(VersionedMutex::new(Tid::ZERO)),
            }),
            SystemMode::Locking => Record::Locking(LockingRecord {
                cell,
                rw: CacheAligned::new(WdRwSpinlock::new()),
                wd: WaitDieLock::new(),
            }),
            SystemMode::Adaptive => Record::Adaptive(AdaptiveRecord {
                cell,
                word: CacheAligned::new(VersionedMutex::new(Tid::ZERO)),
                rw: WdRwSpinlock::new(),
            }),
        }
    }

    /// Variant name
    pub fn variant(&self) -> &'static str {
        match self {
            Record::Partition(_) => "partition",
            Record::Occ(_) => "occ",
            Record::Locking(_) => "locking",
            Record::Adaptive(_) => "adaptive",
        }
    }

    /// Column access
    pub fn access(&self) -> &dyn RecordAccess {
        match self {
            Record::Partition(r) => r,
            Record::Occ(r) => r,
            Record::Locking(r) => r,
            Record::Adaptive(r) => r,
        }
    }

    /// OCC surface, if this variant has one
    pub fn occ(&self) -> std::result::Result<&dyn OccSurface, ProtocolMisuse> {
        match self {
            Record::Occ(r) => Ok(r),
            Record::Adaptive(r) => Ok(r),
            _ => Err(ProtocolMisuse { variant: self.variant(), surface: "occ" }),
        }
    }

    /// 2PL surface, if this variant has one
    pub fn locking(&self) -> std::result::Result<&dyn LockSurface, ProtocolMisuse> {
        match self {
            Record::Locking(r) => Ok(r),
            Record::Adaptive(r) => Ok(r),
            _ => Err(ProtocolMisuse { variant: self.variant(), surface: "locking" }),
        }
    }

    /// The record's key
    pub fn key(&self) -> Key {
        self.access().key()
    }

    /// Re-key a record that has not been published yet
    pub fn set_key(&mut self, key: Key) {
        match self {
            Record::Partition(r) => r.cell.key = key,
            Record::Occ(r) => r.cell.key = key,
            Record::Locking(r) => r.cell.key = key,
            Record::Adaptive(r) => r.cell.key = key,
        }
    }

    /// Stamp the initial version of a record that has not been published
    pub fn stamp(&self, tid: Tid) {
        match self {
            Record::Occ(r) => r.word.reset(tid),
            Record::Adaptive(r) => r.word.reset(tid),
            Record::Partition(_) | Record::Locking(_) => {}
        }
    }

    /// Read one column
    pub fn get_value(&self, col: ColumnId) -> Result<Value> {
        self.access().get_value(col)
    }

    /// Overwrite one column
    pub fn set_value(&self, col: ColumnId, value: Value) -> Result<()> {
        self.access().set_value(col, value)
    }

    /// Add to one column in place
    pub fn delta_value(&self, col: ColumnId, delta: &Value) -> Result<()> {
        self.access().delta_value(col, delta)
    }

    /// Whether `value` could be written to column `col`
    pub fn check_value(&self, col: ColumnId, value: &Value) -> Result<()> {
        self.access().check_value(col, value)
    }

    /// Copy of every column
    pub fn snapshot(&self) -> Vec<Value> {
        self.access().snapshot()
    }
}
