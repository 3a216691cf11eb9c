//! Process-wide event broadcast.
//!
//! Subscriptions are registered during startup and dispatched from the
//! interrupt thread when the event line is raised (typically by
//! [`NetStack::interrupt`](crate::stack::NetStack::interrupt) on
//! termination).  Each transport layer subscribes a handler that interrupts
//! every in-use endpoint context, so blocking socket calls unwind with an
//! EINTR-class error.

use std::sync::Arc;
use std::sync::Mutex;

use crate::stack::StackInner;
use crate::sync;

/// Event subscription callback.
pub type EventHandler = Box<dyn Fn(&Arc<StackInner>) + Send + Sync>;

/// Append-only list of event subscriptions.
pub struct EventHub {
    handlers: Mutex<Vec<EventHandler>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler.  Startup only.
    pub fn subscribe(&self, handler: EventHandler) {
        sync::lock(&self.handlers).push(handler);
    }

    /// Invoke every subscription in registration order.
    ///
    /// Runs on the interrupt thread.  The list lock is held across dispatch;
    /// handlers must not subscribe from within a callback.
    pub fn dispatch(&self, stack: &Arc<StackInner>) {
        let handlers = sync::lock(&self.handlers);
        log::debug!("event: dispatching to {} subscriptions", handlers.len());
        for handler in handlers.iter() {
            handler(stack);
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
