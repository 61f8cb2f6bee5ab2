//! # Cancellable Context
//!
//! A [`Context`] threads through `take_ctx` and the multi-source helpers so
//! that a set of blocking receives can be abandoned as one unit: cancel the
//! context and every receiver parked on it returns
//! [`crate::StackError::Cancelled`] without consuming data.
//!
//! ## Mechanics
//! - The cancelled flag is an atomic, so receivers can poll it while
//!   holding their own stack's lock without touching the context's lock.
//! - A deadline, when present, reads as cancellation once it passes; no
//!   timer task exists, receivers bound their waits by the deadline.
//! - Receivers register their stack's shared state before waiting and
//!   deregister afterwards. `cancel` walks the registry and wakes every
//!   registered stack, so no receiver is left parked. This is what keeps
//!   timeouts from leaking waiter tasks.
//!
//! Lock order: the registry lock is never taken while holding a stack
//! lock (registration happens before the wait acquires the stack mutex,
//! deregistration after it is released), so cancel's registry-then-stack
//! acquisition cannot deadlock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::stack::Shared;

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    waiters: Mutex<Vec<Weak<Shared>>>,
}

/// Cloneable cancellation handle with an optional deadline.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A context that never expires on its own.
    pub fn background() -> Context {
        Context::build(None)
    }

    /// A context that reads as cancelled once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Context {
        Context::build(Some(Instant::now() + timeout))
    }

    fn build(deadline: Option<Instant>) -> Context {
        Context {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancel the context and wake every registered blocking receiver.
    /// Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("context cancelled");
        let waiters = {
            let mut registry = self.inner.waiters.lock().unwrap();
            std::mem::take(&mut *registry)
        };
        for waiter in waiters {
            if let Some(shared) = waiter.upgrade() {
                shared.interrupt();
            }
        }
    }

    /// True once [`Context::cancel`] was called or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.inner.deadline {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// The deadline, if this context carries one.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Record a stack whose condition variable must be signalled on
    /// cancellation. A receiver registers before parking.
    pub(crate) fn register(&self, shared: Weak<Shared>) {
        let mut registry = self.inner.waiters.lock().unwrap();
        registry.push(shared);
    }

    /// Drop one registration for `shared` once the wait has returned.
    pub(crate) fn deregister(&self, shared: &Arc<Shared>) {
        let mut registry = self.inner.waiters.lock().unwrap();
        if let Some(at) = registry
            .iter()
            .position(|w| w.upgrade().is_some_and(|s| Arc::ptr_eq(&s, shared)))
        {
            registry.swap_remove(at);
        }
    }
}
