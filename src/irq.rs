//! Interrupt lines and the signal-set abstraction.
//!
//! The stack emulates hardware interrupts with an in-process signal set:
//! a pending-line bitmask guarded by a mutex, plus a condition variable the
//! dedicated interrupt thread blocks on.  [`raise`](IrqController::raise)
//! may be called from any thread and coalesces like a POSIX signal — a line
//! that is already pending stays a single delivery.
//!
//! Line assignment:
//!
//! - [`IRQ_SHUTDOWN`] terminates the interrupt thread's loop.
//! - [`IRQ_SOFT`] triggers the soft-IRQ ingress-queue drain.
//! - [`IRQ_EVENT`] dispatches the process-wide event subscriptions.
//! - [`IRQ_TIMER`] ticks the timer list; a ticker thread raises it at
//!   [`TICK_INTERVAL`].
//! - Lines from [`IRQ_BASE`] up are handed to devices in registration
//!   order, so handler dispatch in ascending line order matches
//!   registration order.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::sync;

/// Terminates the interrupt loop.
pub const IRQ_SHUTDOWN: u8 = 0;
/// Soft-IRQ: drain the per-protocol ingress queues.
pub const IRQ_SOFT: u8 = 1;
/// Process-wide event broadcast.
pub const IRQ_EVENT: u8 = 2;
/// Periodic timer tick.
pub const IRQ_TIMER: u8 = 3;
/// First device line.
pub const IRQ_BASE: u8 = 4;

/// Number of usable lines (bitmask width).
pub const IRQ_LINES: u8 = 64;

/// Period of the timer tick line.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// In-process interrupt controller.
pub struct IrqController {
    pending: Mutex<u64>,
    cond: Condvar,
}

impl IrqController {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Mark `line` pending and wake the interrupt thread.
    ///
    /// Raising an already-pending line is a no-op, mirroring signal
    /// coalescing.
    pub fn raise(&self, line: u8) {
        debug_assert!(line < IRQ_LINES);
        let mut pending = sync::lock(&self.pending);
        *pending |= 1u64 << line;
        self.cond.notify_one();
    }

    /// Block until at least one line is pending, then take and clear the
    /// whole pending set.
    pub fn wait(&self) -> u64 {
        let mut pending = sync::lock(&self.pending);
        while *pending == 0 {
            pending = sync::wait(&self.cond, pending);
        }
        std::mem::take(&mut *pending)
    }
}

impl Default for IrqController {
    fn default() -> Self {
        Self::new()
    }
}
