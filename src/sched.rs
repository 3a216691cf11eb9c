//! Blocking-call scheduler contexts.
//!
//! Every UDP/TCP endpoint owns a [`SchedCtx`]: a condition variable, a
//! waiter counter, and an interrupt flag.  Application threads sleep on the
//! context while holding the owning table's mutex; protocol handlers wake
//! them with a broadcast.  The cancellation event interrupts every sleeper,
//! which then returns an EINTR-class error to its caller.
//!
//! # Concurrency
//!
//! The waiter counter and interrupt flag are only mutated while the owning
//! table mutex is held (either directly or inside [`sleep`](SchedCtx::sleep),
//! which reacquires it around the condition wait).  This makes the
//! "last waiter out releases the endpoint" check race-free.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, MutexGuard};

use crate::sync;

/// Per-endpoint scheduler context.
pub struct SchedCtx {
    cond: Condvar,
    waiters: AtomicUsize,
    interrupted: AtomicBool,
}

impl SchedCtx {
    pub const fn new() -> Self {
        Self {
            cond: Condvar::new(),
            waiters: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Sleep on this context, releasing `guard` while waiting.
    ///
    /// Returns the reacquired guard and `true` if the sleep was (or already
    /// had been) interrupted.  An interrupted context stays interrupted
    /// until [`clear`](Self::clear) — repeated sleeps return immediately so
    /// a cancelled blocking call cannot re-block on its way out.
    ///
    /// Spurious wakeups are possible; callers re-check their predicate.
    pub fn sleep<'a, T>(&self, guard: MutexGuard<'a, T>) -> (MutexGuard<'a, T>, bool) {
        if self.interrupted.load(Ordering::Relaxed) {
            return (guard, true);
        }
        self.waiters.fetch_add(1, Ordering::Relaxed);
        let guard = sync::wait(&self.cond, guard);
        self.waiters.fetch_sub(1, Ordering::Relaxed);
        (guard, self.interrupted.load(Ordering::Relaxed))
    }

    /// Broadcast-wake every sleeper.
    pub fn wakeup(&self) {
        self.cond.notify_all();
    }

    /// Set the interrupt flag and broadcast, causing sleepers to return
    /// with the interrupted bit set.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
        self.cond.notify_all();
    }

    /// Number of threads currently blocked on this context.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Reset the interrupt flag.  Called when the owning endpoint slot is
    /// reused.
    pub fn clear(&self) {
        self.interrupted.store(false, Ordering::Relaxed);
    }
}

impl Default for SchedCtx {
    fn default() -> Self {
        Self::new()
    }
}
