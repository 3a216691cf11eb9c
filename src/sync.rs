//! Poison-tolerant wrappers around `std::sync` locking.
//!
//! A panicking application thread must not wedge the interrupt thread or
//! other sockets, so the stack treats a poisoned mutex as still usable and
//! takes the inner guard.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Wait on `cond`, recovering the guard if the mutex was poisoned.
pub(crate) fn wait<'a, T>(cond: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    match cond.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
