//! Interval timers driven by the periodic tick line.
//!
//! Each timer holds an interval, the timestamp of its last firing, and a
//! callback.  [`TimerList::tick`] runs on the interrupt thread whenever
//! [`IRQ_TIMER`](crate::irq::IRQ_TIMER) is raised and fires every timer
//! whose interval has elapsed, updating its `last` stamp.
//!
//! The list is append-only after startup.  Callbacks run with the list lock
//! held; they take their own subsystem locks (ARP cache sweep takes the
//! cache lock) but never the timer lock, so no ordering cycle exists.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::stack::StackInner;
use crate::sync;

/// Timer callback, invoked from the interrupt thread.
pub type TimerHandler = Box<dyn Fn(&Arc<StackInner>) + Send + Sync>;

struct NetTimer {
    interval: Duration,
    last: Instant,
    handler: TimerHandler,
}

/// Append-only list of interval timers.
pub struct TimerList {
    timers: Mutex<Vec<NetTimer>>,
}

impl TimerList {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Register a timer.  Startup only.
    pub fn register(&self, interval: Duration, handler: TimerHandler) {
        sync::lock(&self.timers).push(NetTimer {
            interval,
            last: Instant::now(),
            handler,
        });
    }

    /// Fire every timer whose interval has elapsed since its last firing.
    pub fn tick(&self, stack: &Arc<StackInner>) {
        let now = Instant::now();
        let mut timers = sync::lock(&self.timers);
        for timer in timers.iter_mut() {
            if now.duration_since(timer.last) >= timer.interval {
                (timer.handler)(stack);
                timer.last = now;
            }
        }
    }
}

impl Default for TimerList {
    fn default() -> Self {
        Self::new()
    }
}
