//! Versioned mutex: a lock bit packed with the last committed TID
//!
//! ```text
//!  63   62                                0
//! +----+----------------------------------+
//! |LOCK|        version (TID)             |
//! +----+----------------------------------+
//! ```
//!
//! Locking keeps the version bits untouched, so a reader that sees the word
//! locked still learns which version is being replaced. Unlocking installs
//! the new version and clears the bit in one store.

use adaptcc_core::types::Tid;
use std::sync::atomic::{AtomicU64, Ordering};

const LOCK_BIT: u64 = 1 << 63;

/// Lock bit + version in one atomic word
#[derive(Debug, Default)]
pub struct VersionedMutex {
    word: AtomicU64,
}

impl VersionedMutex {
    /// Unlocked, at version `tid`
    pub const fn new(tid: Tid) -> Self {
        Self { word: AtomicU64::new(tid.raw() & !LOCK_BIT) }
    }

    /// Single attempt to lock
    ///
    /// Returns whether the lock was taken, plus the version observed.
    pub fn lock(&self) -> (bool, Tid) {
        let cur = self.word.load(Ordering::Acquire);
        if cur & LOCK_BIT != 0 {
            return (false, Tid::new(cur & !LOCK_BIT));
        }
        match self
            .word
            .compare_exchange(cur, cur | LOCK_BIT, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => (true, Tid::new(cur)),
            Err(seen) => (false, Tid::new(seen & !LOCK_BIT)),
        }
    }

    /// Publish `tid` and release
    pub fn unlock(&self, tid: Tid) {
        debug_assert!(self.is_locked(), "unlock of unlocked versioned mutex");
        self.word.store(tid.raw() & !LOCK_BIT, Ordering::Release);
    }

    /// Overwrite the version and clear the lock bit
    ///
    /// Only for words nobody else can see yet, e.g. a freshly inserted
    /// record before it is published to the store.
    pub fn reset(&self, tid: Tid) {
        self.word.store(tid.raw() & !LOCK_BIT, Ordering::Release);
    }

    /// Snapshot: `(unlocked, version)`
    pub fn is_unlocked(&self) -> (bool, Tid) {
        let cur = self.word.load(Ordering::Acquire);
        (cur & LOCK_BIT == 0, Tid::new(cur & !LOCK_BIT))
    }

    /// Current version, ignoring the lock bit
    pub fn version(&self) -> Tid {
        self.is_unlocked().1
    }

    /// Whether the lock bit is set
    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Acquire) & LOCK_BIT != 0
    }
}
