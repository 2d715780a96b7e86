//! Blocking spinlocks
//!
//! Both locks spin for a trial budget, then yield the scheduler and start a
//! fresh budget. They never fail; callers that must avoid deadlock use the
//! bounded variants in [`crate::wd_spinlock`].

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Offset a writer subtracts from the reader count.
pub(crate) const WRITER_SENTINEL: i32 = 1 << 30;

/// Spin-then-yield helper
///
/// `snooze` spins `trial` times, then yields once and resets.
#[derive(Debug)]
pub struct Backoff {
    spins: u32,
    trial: u32,
}

impl Backoff {
    /// Start a backoff with the given spin budget
    pub fn new(trial: u32) -> Self {
        Self { spins: 0, trial: trial.max(1) }
    }

    /// Wait a little
    #[inline]
    pub fn snooze(&mut self) {
        if self.spins < self.trial {
            self.spins += 1;
            std::hint::spin_loop();
        } else {
            self.spins = 0;
            std::thread::yield_now();
        }
    }
}

/// Exclusive spinlock
///
/// Not tied to a thread: one thread may lock and another unlock.
#[derive(Debug)]
pub struct Spinlock {
    locked: AtomicBool,
    trial: u32,
}

impl Spinlock {
    /// Create an unlocked spinlock that yields every `trial` spins
    pub const fn new(trial: u32) -> Self {
        Self { locked: AtomicBool::new(false), trial }
    }

    /// Single attempt
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire, spinning and yielding until available
    pub fn lock(&self) {
        let mut backoff = Backoff::new(self.trial);
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// Release
    #[inline]
    pub fn unlock(&self) {
        let was = self.locked.swap(false, Ordering::Release);
        debug_assert!(was, "unlock of unlocked spinlock");
    }

    /// Whether someone holds the lock right now
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Reader/writer spinlock that blocks until acquired
///
/// Readers increment a counter. A writer first takes an exclusive
/// [`Spinlock`] against other writers, then subtracts a large sentinel,
/// which turns the counter negative and turns away new readers, and spins
/// until the readers already inside have drained.
#[derive(Debug)]
pub struct RwSpinlock {
    writer: Spinlock,
    readers: AtomicI32,
    trial: u32,
}

impl RwSpinlock {
    /// Create an unlocked reader/writer spinlock
    pub const fn new(trial: u32) -> Self {
        Self { writer: Spinlock::new(trial), readers: AtomicI32::new(0), trial }
    }

    /// Acquire shared
    ///
    /// A reader that finds a writer draining backs its increment out
    /// before waiting; the writer only counts readers that got in.
    pub fn rlock(&self) {
        let mut backoff = Backoff::new(self.trial);
        while self.readers.fetch_add(1, Ordering::Acquire) < 0 {
            self.readers.fetch_sub(1, Ordering::Relaxed);
            while self.readers.load(Ordering::Acquire) < 0 {
                backoff.snooze();
            }
        }
    }

    /// Release shared
    pub fn runlock(&self) {
        self.readers.fetch_sub(1, Ordering::Release);
    }

    /// Acquire exclusive, waiting for readers to drain
    pub fn lock(&self) {
        self.writer.lock();
        let mut inside = self.readers.fetch_sub(WRITER_SENTINEL, Ordering::AcqRel);
        let mut backoff = Backoff::new(self.trial);
        while inside != 0 {
            backoff.snooze();
            inside = self.readers.load(Ordering::Acquire) + WRITER_SENTINEL;
        }
    }

    /// Release exclusive
    pub fn unlock(&self) {
        self.readers.fetch_add(WRITER_SENTINEL, Ordering::Release);
        self.writer.unlock();
    }

    /// Readers currently holding the lock (zero while write-held)
    pub fn reader_count(&self) -> usize {
        self.readers.load(Ordering::Relaxed).max(0) as usize
    }

    /// Whether a writer holds or is acquiring the lock
    pub fn is_write_locked(&self) -> bool {
        self.readers.load(Ordering::Relaxed) < 0
    }
}
