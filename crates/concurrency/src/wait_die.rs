//! Wait-die lock manager
//!
//! Each lockable record owns a [`WaitDieLock`]: a latch-protected pair of
//! singly linked lists, owners and waiters, whose entries live in a small
//! per-lock arena and are recycled through an index free list.
//!
//! ## Rules
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Compatible with owners, younger than every waiter | `Granted` |
//! | Sole owner asks for a stronger mode | upgraded in place, `Granted` |
//! | Conflict (or older than a queued waiter), older than every other owner | `Wait` |
//! | Anything else | `Die` |
//!
//! Waiters are sorted oldest first. Unlock promotes compatible waiters from
//! the head. Any waiter that ends up behind an older owner after a
//! promotion is told to die, so a queued request is always older than every
//! owner it waits on and no wait cycle can form.
//!
//! Waiting happens outside the latch, on the request's completion channel.

use adaptcc_core::types::Tid;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::trace;

const NIL: u32 = u32::MAX;

/// Requested or granted lock strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LockMode {
    /// Not held
    #[default]
    None,
    /// Shared (read)
    Shared,
    /// Exclusive (write)
    Exclusive,
}

impl LockMode {
    /// Whether two modes may not be held together
    pub fn conflicts(self, other: LockMode) -> bool {
        !matches!(
            (self, other),
            (LockMode::None, _) | (_, LockMode::None) | (LockMode::Shared, LockMode::Shared)
        )
    }
}

/// Immediate result of a lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Lock held on return
    Granted,
    /// Queued; the completion channel will report the result
    Wait,
    /// Refused; the requester must abort
    Die,
}

/// Completion channel for a transaction's blocking lock requests
///
/// One per transaction, reused across requests: a transaction never has
/// more than one request queued.
#[derive(Debug)]
pub struct Waiter {
    tx: Sender<bool>,
    rx: Receiver<bool>,
    timeout: Duration,
}

impl Waiter {
    /// Create a waiter that gives up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx, timeout }
    }

    fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[derive(Debug)]
struct Slot {
    tid: Tid,
    mode: LockMode,
    next: u32,
    signal: Option<Sender<bool>>,
}

#[derive(Debug, Clone, Copy)]
enum List {
    Owners,
    Waiters,
}

#[derive(Debug)]
struct Queues {
    granted: LockMode,
    owners: u32,
    waiters: u32,
    free: u32,
    slots: Vec<Slot>,
}

impl Queues {
    const fn new() -> Self {
        Self { granted: LockMode::None, owners: NIL, waiters: NIL, free: NIL, slots: Vec::new() }
    }

    fn head(&self, list: List) -> u32 {
        match list {
            List::Owners => self.owners,
            List::Waiters => self.waiters,
        }
    }

    fn head_mut(&mut self, list: List) -> &mut u32 {
        match list {
            List::Owners => &mut self.owners,
            List::Waiters => &mut self.waiters,
        }
    }

    fn alloc(&mut self, tid: Tid, mode: LockMode, signal: Option<Sender<bool>>) -> u32 {
        let slot = Slot { tid, mode, next: NIL, signal };
        if self.free != NIL {
            let idx = self.free;
            self.free = self.slots[idx as usize].next;
            self.slots[idx as usize] = slot;
            idx
        } else {
            self.slots.push(slot);
            (self.slots.len() - 1) as u32
        }
    }

    fn release(&mut self, idx: u32) {
        let slot = &mut self.slots[idx as usize];
        slot.signal = None;
        slot.mode = LockMode::None;
        slot.next = self.free;
        self.free = idx;
    }

    /// `(predecessor, index)` of `tid` in `list`
    fn find(&self, list: List, tid: Tid) -> Option<(u32, u32)> {
        let mut prev = NIL;
        let mut cur = self.head(list);
        while cur != NIL {
            if self.slots[cur as usize].tid == tid {
                return Some((prev, cur));
            }
            prev = cur;
            cur = self.slots[cur as usize].next;
        }
        None
    }

    fn unlink(&mut self, list: List, prev: u32, idx: u32) {
        let next = self.slots[idx as usize].next;
        if prev == NIL {
            *self.head_mut(list) = next;
        } else {
            self.slots[prev as usize].next = next;
        }
        self.slots[idx as usize].next = NIL;
    }

    fn push_owner(&mut self, idx: u32) {
        self.slots[idx as usize].next = self.owners;
        self.owners = idx;
    }

    fn insert_waiter(&mut self, idx: u32) {
        let tid = self.slots[idx as usize].tid;
        let mut prev = NIL;
        let mut cur = self.waiters;
        while cur != NIL && self.slots[cur as usize].tid < tid {
            prev = cur;
            cur = self.slots[cur as usize].next;
        }
        self.slots[idx as usize].next = cur;
        if prev == NIL {
            self.waiters = idx;
        } else {
            self.slots[prev as usize].next = idx;
        }
    }

    fn entries(&self, list: List) -> Vec<(Tid, LockMode)> {
        let mut out = Vec::new();
        let mut cur = self.head(list);
        while cur != NIL {
            let s = &self.slots[cur as usize];
            out.push((s.tid, s.mode));
            cur = s.next;
        }
        out
    }

    fn owner_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.owners;
        while cur != NIL {
            n += 1;
            cur = self.slots[cur as usize].next;
        }
        n
    }

    fn youngest_waiter(&self) -> Option<Tid> {
        let mut cur = self.waiters;
        let mut last = None;
        while cur != NIL {
            last = Some(self.slots[cur as usize].tid);
            cur = self.slots[cur as usize].next;
        }
        last
    }

    /// Some owner other than `tid` is older than `tid`
    fn has_older_owner(&self, tid: Tid) -> bool {
        let mut cur = self.owners;
        while cur != NIL {
            let s = &self.slots[cur as usize];
            if s.tid != tid && s.tid < tid {
                return true;
            }
            cur = s.next;
        }
        false
    }

    fn recompute_granted(&mut self) {
        let mut mode = LockMode::None;
        let mut cur = self.owners;
        while cur != NIL {
            mode = mode.max(self.slots[cur as usize].mode);
            cur = self.slots[cur as usize].next;
        }
        self.granted = mode;
    }

    fn enqueue_or_die(&mut self, tid: Tid, mode: LockMode, signal: Option<&Sender<bool>>) -> LockOutcome {
        let Some(signal) = signal else {
            return LockOutcome::Die;
        };
        if self.has_older_owner(tid) {
            return LockOutcome::Die;
        }
        let idx = self.alloc(tid, mode, Some(signal.clone()));
        self.insert_waiter(idx);
        LockOutcome::Wait
    }

    fn notify(&mut self, idx: u32, granted: bool) {
        if let Some(signal) = self.slots[idx as usize].signal.take() {
            // capacity 1, one outstanding request per waiter
            let _ = signal.try_send(granted);
        }
    }

    fn promote(&mut self) {
        let mut promoted = false;
        loop {
            if self.owner_count() == 1 {
                let sole = self.slots[self.owners as usize].tid;
                if let Some((prev, w)) = self.find(List::Waiters, sole) {
                    let mode = self.slots[w as usize].mode;
                    let own = self.owners;
                    self.slots[own as usize].mode = mode;
                    self.granted = mode;
                    self.unlink(List::Waiters, prev, w);
                    self.notify(w, true);
                    self.release(w);
                    trace!(tid = %sole, "wait-die upgrade granted");
                    continue;
                }
            }

            let head = self.waiters;
            if head == NIL {
                break;
            }
            let (tid, mode) = {
                let s = &self.slots[head as usize];
                (s.tid, s.mode)
            };
            if self.find(List::Owners, tid).is_some() || self.granted.conflicts(mode) {
                break;
            }
            self.unlink(List::Waiters, NIL, head);
            self.notify(head, true);
            self.push_owner(head);
            self.granted = self.granted.max(mode);
            promoted = true;
            trace!(tid = %tid, ?mode, "wait-die waiter granted");
        }

        if promoted {
            let mut prev = NIL;
            let mut cur = self.waiters;
            while cur != NIL {
                let next = self.slots[cur as usize].next;
                let tid = self.slots[cur as usize].tid;
                if self.has_older_owner(tid) {
                    self.unlink(List::Waiters, prev, cur);
                    self.notify(cur, false);
                    self.release(cur);
                    trace!(tid = %tid, "wait-die waiter dies behind older owner");
                } else {
                    prev = cur;
                }
                cur = next;
            }
        }
    }
}

/// Per-record wait-die lock
#[derive(Debug)]
pub struct WaitDieLock {
    queues: Mutex<Queues>,
}

impl Default for WaitDieLock {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitDieLock {
    /// Create an unheld lock
    pub const fn new() -> Self {
        Self { queues: Mutex::new(Queues::new()) }
    }

    /// Issue a request without blocking
    ///
    /// `signal` is where a queued request learns its fate. Without one the
    /// request never waits: every conflict dies.
    pub fn request(&self, tid: Tid, mode: LockMode, signal: Option<&Sender<bool>>) -> LockOutcome {
        let mut q = self.queues.lock();

        if let Some((_, idx)) = q.find(List::Owners, tid) {
            let held = q.slots[idx as usize].mode;
            if held >= mode {
                return LockOutcome::Granted;
            }
            if q.owner_count() == 1 {
                q.slots[idx as usize].mode = mode;
                q.granted = mode;
                return LockOutcome::Granted;
            }
            let outcome = q.enqueue_or_die(tid, mode, signal);
            trace!(tid = %tid, ?outcome, "wait-die upgrade request");
            return outcome;
        }

        let behind_waiter = q.youngest_waiter().is_some_and(|w| tid < w);
        if !q.granted.conflicts(mode) && !behind_waiter {
            let idx = q.alloc(tid, mode, None);
            q.push_owner(idx);
            q.granted = q.granted.max(mode);
            return LockOutcome::Granted;
        }
        let outcome = q.enqueue_or_die(tid, mode, signal);
        trace!(tid = %tid, ?mode, ?outcome, "wait-die conflict");
        outcome
    }

    /// Request and, if queued, block on `waiter` until granted, killed, or
    /// timed out. Returns whether the lock is held.
    pub fn acquire(&self, tid: Tid, mode: LockMode, waiter: Option<&Waiter>) -> bool {
        if let Some(w) = waiter {
            w.drain();
        }
        match (self.request(tid, mode, waiter.map(|w| &w.tx)), waiter) {
            (LockOutcome::Granted, _) => true,
            (LockOutcome::Wait, Some(w)) => match w.rx.recv_timeout(w.timeout) {
                Ok(granted) => granted,
                Err(_) => {
                    if self.cancel(tid) {
                        trace!(tid = %tid, "wait-die wait timed out");
                        false
                    } else {
                        // resolved between the timeout and the cancel
                        w.rx.try_recv().unwrap_or(false)
                    }
                }
            },
            _ => false,
        }
    }

    /// Drop `tid`'s ownership and promote waiters
    pub fn unlock(&self, tid: Tid) {
        let mut q = self.queues.lock();
        if let Some((prev, idx)) = q.find(List::Owners, tid) {
            q.unlink(List::Owners, prev, idx);
            q.release(idx);
            q.recompute_granted();
        } else if let Some((prev, idx)) = q.find(List::Waiters, tid) {
            q.unlink(List::Waiters, prev, idx);
            q.release(idx);
        }
        q.promote();
    }

    /// Withdraw a queued request. Returns `false` if it was no longer
    /// queued, i.e. it had already been granted or killed.
    pub fn cancel(&self, tid: Tid) -> bool {
        let mut q = self.queues.lock();
        match q.find(List::Waiters, tid) {
            Some((prev, idx)) => {
                q.unlink(List::Waiters, prev, idx);
                q.release(idx);
                q.promote();
                true
            }
            None => false,
        }
    }

    /// Strongest mode currently granted
    pub fn mode(&self) -> LockMode {
        self.queues.lock().granted
    }

    /// Mode `tid` holds, `None` if not an owner
    pub fn held_by(&self, tid: Tid) -> LockMode {
        let q = self.queues.lock();
        q.find(List::Owners, tid)
            .map(|(_, idx)| q.slots[idx as usize].mode)
            .unwrap_or(LockMode::None)
    }

    /// Whether an exclusive lock is granted
    pub fn is_write_locked(&self) -> bool {
        self.mode() == LockMode::Exclusive
    }

    /// Owners, most recent first
    pub fn owners(&self) -> Vec<(Tid, LockMode)> {
        self.queues.lock().entries(List::Owners)
    }

    /// Waiters, oldest first
    pub fn waiters(&self) -> Vec<(Tid, LockMode)> {
        self.queues.lock().entries(List::Waiters)
    }
}
