//! Bounded spinlocks for deadlock avoidance
//!
//! Every acquire takes an explicit trial budget and returns `false` once
//! the budget is spent. A `false` is a transaction abort, never a reason to
//! loop: giving up is what breaks lock cycles between 2PL transactions.
//!
//! The reader/writer layout matches [`crate::spinlock::RwSpinlock`]: a
//! reader count that a writer drives negative with a large sentinel.

use crate::spinlock::WRITER_SENTINEL;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Exclusive spinlock with a bounded acquire
#[derive(Debug, Default)]
pub struct WdSpinlock {
    locked: AtomicBool,
}

impl WdSpinlock {
    /// Create an unlocked lock
    pub const fn new() -> Self {
        Self { locked: AtomicBool::new(false) }
    }

    /// Try up to `trial` times
    pub fn lock(&self, trial: u32) -> bool {
        for _ in 0..trial {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
            std::hint::spin_loop();
        }
        false
    }

    /// Release
    pub fn unlock(&self) {
        let was = self.locked.swap(false, Ordering::Release);
        debug_assert!(was, "unlock of unlocked wd spinlock");
    }
}

/// Reader/writer spinlock with bounded acquires
#[derive(Debug, Default)]
pub struct WdRwSpinlock {
    writer: WdSpinlock,
    readers: AtomicI32,
}

impl WdRwSpinlock {
    /// Create an unlocked lock
    pub const fn new() -> Self {
        Self { writer: WdSpinlock::new(), readers: AtomicI32::new(0) }
    }

    /// Acquire shared within `trial` attempts
    pub fn rlock(&self, trial: u32) -> bool {
        if self.readers.fetch_add(1, Ordering::Acquire) + 1 >= 0 {
            return true;
        }
        for _ in 0..trial {
            std::hint::spin_loop();
            if self.readers.load(Ordering::Acquire) >= 0 {
                return true;
            }
        }
        self.readers.fetch_sub(1, Ordering::Release);
        false
    }

    /// Release shared
    pub fn runlock(&self) {
        self.readers.fetch_sub(1, Ordering::Release);
    }

    /// Acquire exclusive within `trial` attempts
    pub fn lock(&self, trial: u32) -> bool {
        if !self.writer.lock(trial) {
            return false;
        }
        let inside = self.readers.fetch_sub(WRITER_SENTINEL, Ordering::AcqRel);
        self.drain(inside, trial)
    }

    /// Convert the caller's shared hold into exclusive
    ///
    /// Succeeds only once the caller is the sole reader. On failure the
    /// shared hold is released too.
    pub fn upgrade(&self, trial: u32) -> bool {
        if !self.writer.lock(trial) {
            self.runlock();
            return false;
        }
        // our own read hold leaves with the sentinel
        let others = self.readers.fetch_sub(WRITER_SENTINEL + 1, Ordering::AcqRel) - 1;
        self.drain(others, trial)
    }

    /// Release exclusive
    pub fn unlock(&self) {
        self.readers.fetch_add(WRITER_SENTINEL, Ordering::Release);
        self.writer.unlock();
    }

    /// Whether a writer holds or is acquiring the lock
    pub fn is_write_locked(&self) -> bool {
        self.readers.load(Ordering::Acquire) < 0
    }

    /// Readers currently holding the lock (zero while write-held)
    pub fn reader_count(&self) -> usize {
        self.readers.load(Ordering::Relaxed).max(0) as usize
    }

    fn drain(&self, mut inside: i32, trial: u32) -> bool {
        let mut left = trial;
        while inside != 0 {
            if left == 0 {
                self.unlock();
                return false;
            }
            left -= 1;
            std::hint::spin_loop();
            inside = self.readers.load(Ordering::Acquire) + WRITER_SENTINEL;
        }
        true
    }
}
