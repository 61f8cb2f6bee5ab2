//! # Stack: the Coordination Container
//!
//! The central abstraction of the runtime. A [`Stack`] wraps an element
//! store with a declared element type, a switchable access perspective, an
//! optional capacity cap, freeze/close flags, and a mutex/condition pair
//! that carries the wakeup signal for blocking receivers.
//!
//! ## High-level model
//! - **Handle semantics**: `Stack` is a cheap clone over shared state, the
//!   way channel endpoints are. Tasks share a stack by cloning the handle.
//! - **Perspective** decides how positional parameters are read: offset
//!   from the end (LIFO), offset from the head (FIFO), absolute position
//!   (Indexed), or keyed lookup (Hash).
//! - **Blocking**: `take` parks the caller on the condition variable until
//!   an element arrives, the stack closes, a timeout passes, or an attached
//!   [`Context`] is cancelled.
//! - **Error precedence**: every guarded entry point consults the global
//!   error stack first and fails with [`StackError::ErrorsPending`] before
//!   touching any state. See [`crate::fault`].
//!
//! ## Hash perspective
//! Keyed removal leaves a tombstone in the slot so coexisting positional
//! cursors keep their offsets; the hash index maps exactly the keys whose
//! slot is live. Switching a positional stack to Hash synthesises keys from
//! positional indices for elements that lack one.
//!
//! ## Locking
//! All public operations take the stack's one mutex for a short critical
//! section and never call user code while holding it. The single exception
//! is the compute-block raw path in [`raw`], which is a compiler-only
//! contract: the generated code holds the lock for a bounded straight-line
//! sequence with no suspension and no re-entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::codec::{self, ElemType};
use crate::context::Context;
use crate::error::StackError;
use crate::fault;
use crate::store::ElementStore;

mod raw;
pub use raw::RawStack;


/// Access mode through which positional parameters are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Perspective {
    /// Offset from the end; 0 is the newest element.
    Lifo,
    /// Offset from the head; 0 is the oldest element.
    Fifo,
    /// Absolute position among live elements.
    Indexed,
    /// Keyed lookup; positional parameters are rejected.
    Hash,
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Perspective::Lifo => "lifo",
            Perspective::Fifo => "fifo",
            Perspective::Indexed => "indexed",
            Perspective::Hash => "hash",
        };
        f.write_str(name)
    }
}

/// Shared state behind every handle to one stack.
pub(crate) struct Shared {
    elem_type: ElemType,
    capacity: usize,
    /// The global error stack itself runs unguarded so it stays operable
    /// while errors are pending.
    guarded: bool,
    pub(crate) state: Mutex<Core>,
    readable: Condvar,
}

impl Shared {
    /// Wake every receiver parked on this stack. Used by [`Context`] on
    /// cancellation. The lock round-trip pairs the notify with any waiter
    /// that is between its flag check and its wait.
    pub(crate) fn interrupt(&self) {
        let _state = self.state.lock().unwrap();
        self.readable.notify_all();
    }
}

/// Mutable state of a stack, everything the mutex protects.
pub(crate) struct Core {
    pub(crate) store: ElementStore,
    perspective: Perspective,
    /// Key bytes to absolute slot. Present only in Hash perspective.
    hash: Option<HashMap<Vec<u8>, usize>>,
    frozen: bool,
    closed: bool,
}

/// A typed, perspective-bearing container of elements.
#[derive(Clone)]
pub struct Stack {
    shared: Arc<Shared>,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("Stack")
            .field("elem_type", &self.shared.elem_type)
            .field("perspective", &state.perspective)
            .field("len", &state.store.len())
            .field("frozen", &state.frozen)
            .field("closed", &state.closed)
            .finish()
    }
}

impl Stack {
    /// Construct an unbounded stack.
    pub fn new(elem_type: ElemType, perspective: Perspective) -> Stack {
        Stack::build(elem_type, perspective, 0, true)
    }

    /// Construct a stack with a hard capacity. `capacity` of 0 means
    /// unlimited.
    pub fn with_capacity(elem_type: ElemType, perspective: Perspective, capacity: usize) -> Stack {
        Stack::build(elem_type, perspective, capacity, true)
    }

    /// Constructor for the global error stack: identical except that its
    /// operations skip the pending-error guard.
    pub(crate) fn unguarded(elem_type: ElemType, perspective: Perspective) -> Stack {
        Stack::build(elem_type, perspective, 0, false)
    }

    fn build(elem_type: ElemType, perspective: Perspective, capacity: usize, guarded: bool) -> Stack {
        let hash = matches!(perspective, Perspective::Hash).then(HashMap::new);
        Stack {
            shared: Arc::new(Shared {
                elem_type,
                capacity,
                guarded,
                state: Mutex::new(Core {
                    store: ElementStore::new(),
                    perspective,
                    hash,
                    frozen: false,
                    closed: false,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    // ----- Introspection -----

    pub fn elem_type(&self) -> ElemType {
        self.shared.elem_type
    }

    pub fn perspective(&self) -> Perspective {
        self.shared.state.lock().unwrap().perspective
    }

    /// Live element count.
    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity; 0 means unlimited.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_full(&self) -> bool {
        self.shared.capacity > 0 && self.len() >= self.shared.capacity
    }

    pub fn is_frozen(&self) -> bool {
        self.shared.state.lock().unwrap().frozen
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().closed
    }

    /// True when both handles lead to the same shared state.
    pub fn same_stack(&self, other: &Stack) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ----- Mutators -----

    /// Append a value. For Hash perspective use [`Stack::push_keyed`].
    pub fn push(&self, value: Vec<u8>) -> Result<(), StackError> {
        self.push_inner(value, None)
    }

    /// Append a value under a key. Pushing an existing key replaces the
    /// value in its slot without changing the position.
    pub fn push_keyed(&self, value: Vec<u8>, key: Vec<u8>) -> Result<(), StackError> {
        self.push_inner(value, Some(key))
    }

    fn push_inner(&self, value: Vec<u8>, key: Option<Vec<u8>>) -> Result<(), StackError> {
        self.guard()?;
        codec::validate(self.shared.elem_type, &value)?;
        {
            let mut state = self.shared.state.lock().unwrap();
            state.push_value(self.shared.capacity, value, key)?;
        }
        // One new element, one receiver.
        self.shared.readable.notify_one();
        Ok(())
    }

    /// Remove and return the default element for the current perspective:
    /// the newest for LIFO and Indexed, the oldest for FIFO. Hash
    /// perspective requires a key.
    pub fn pop(&self) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let mut state = self.shared.state.lock().unwrap();
        state.ensure_mutable()?;
        match state.perspective {
            Perspective::Hash => Err(StackError::KeyRequired),
            p => state.pop_positional(p, None),
        }
    }

    /// Remove the element at `offset`, interpreted through the current
    /// perspective. Offset 0 is the O(1) fast path; other offsets shift.
    pub fn pop_at(&self, offset: usize) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let mut state = self.shared.state.lock().unwrap();
        state.ensure_mutable()?;
        match state.perspective {
            Perspective::Hash => Err(StackError::KeyRequired),
            p => state.pop_positional(p, Some(offset)),
        }
    }

    /// Remove the element stored under `key`. The slot becomes a tombstone
    /// so coexisting positional cursors keep their offsets.
    pub fn pop_key(&self, key: &[u8]) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let mut state = self.shared.state.lock().unwrap();
        state.ensure_mutable()?;
        if state.perspective != Perspective::Hash {
            return Err(StackError::KeyRejected);
        }
        state.pop_by_key(key)
    }

    // ----- Non-destructive reads -----

    /// Read the default element for the current perspective without
    /// removing it.
    pub fn peek(&self) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let state = self.shared.state.lock().unwrap();
        match state.perspective {
            Perspective::Hash => Err(StackError::KeyRequired),
            p => state.peek_positional(p, None),
        }
    }

    /// Read the element at `offset` through the current perspective.
    pub fn peek_at(&self, offset: usize) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let state = self.shared.state.lock().unwrap();
        match state.perspective {
            Perspective::Hash => Err(StackError::KeyRequired),
            p => state.peek_positional(p, Some(offset)),
        }
    }

    /// Read the element stored under `key`.
    pub fn peek_key(&self, key: &[u8]) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let state = self.shared.state.lock().unwrap();
        if state.perspective != Perspective::Hash {
            return Err(StackError::KeyRejected);
        }
        state.peek_by_key(key)
    }

    /// Ordered clone of the live elements in the current perspective's
    /// traversal order (newest first for LIFO, oldest first otherwise).
    pub fn snapshot(&self) -> Result<Vec<Vec<u8>>, StackError> {
        self.guard()?;
        let state = self.shared.state.lock().unwrap();
        let persp = state.perspective;
        Ok(state
            .walk_slots(persp, 0)
            .into_iter()
            .filter_map(|slot| state.store.get(slot).map(<[u8]>::to_vec))
            .collect())
    }

    /// Ordered `(bytes, key)` clone of the live elements, traversed through
    /// an arbitrary perspective and cursor. The traversal helpers build
    /// their snapshots here so user code never runs under the lock.
    pub(crate) fn snapshot_entries(
        &self,
        perspective: Perspective,
        cursor: usize,
    ) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>, StackError> {
        self.guard()?;
        let core = self.lock_core();
        Ok(core
            .walk_slots(perspective, cursor)
            .into_iter()
            .filter_map(|slot| {
                core.store.get(slot).map(|bytes| {
                    (bytes.to_vec(), core.store.key_at(slot).map(<[u8]>::to_vec))
                })
            })
            .collect())
    }

    // ----- Blocking receive -----

    /// Blocking receive. Waits until an element is available, the optional
    /// timeout expires, or the stack is closed and drained.
    pub fn take(&self, timeout: Option<Duration>) -> Result<Vec<u8>, StackError> {
        self.take_inner(None, timeout)
    }

    /// Blocking receive that additionally honours a cancellable context.
    /// Returns [`StackError::Cancelled`] without consuming data when the
    /// context is cancelled or its deadline passes.
    pub fn take_ctx(&self, ctx: &Context, timeout: Option<Duration>) -> Result<Vec<u8>, StackError> {
        ctx.register(Arc::downgrade(&self.shared));
        let out = self.take_inner(Some(ctx), timeout);
        ctx.deregister(&self.shared);
        out
    }

    fn take_inner(
        &self,
        ctx: Option<&Context>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StackError> {
        self.guard()?;
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if ctx.is_some_and(Context::is_cancelled) {
                // Hand any pending signal to a receiver that can still use it.
                self.shared.readable.notify_one();
                return Err(StackError::Cancelled);
            }
            if !state.store.is_empty() {
                let value = state
                    .take_next()
                    .ok_or(StackError::Empty)?;
                return Ok(value);
            }
            if state.closed {
                return Err(StackError::Closed);
            }

            let ctx_deadline = ctx.and_then(Context::deadline);
            let wake_at = match (deadline, ctx_deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            match wake_at {
                None => {
                    trace!("take: parking receiver");
                    state = self.shared.readable.wait(state).unwrap();
                }
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        if deadline.is_some_and(|d| now >= d) {
                            self.shared.readable.notify_one();
                            return Err(StackError::Timeout);
                        }
                        // The context deadline fired; the next iteration
                        // observes it as cancellation.
                        continue;
                    }
                    let (guard, _timed_out) = self
                        .shared
                        .readable
                        .wait_timeout(state, at - now)
                        .unwrap();
                    state = guard;
                }
            }
        }
    }

    // ----- Lifecycle -----

    /// Close the stack: blocking receivers fail with
    /// [`StackError::Closed`] once the container drains. Idempotent.
    pub fn close(&self) -> Result<(), StackError> {
        self.guard()?;
        let mut state = self.shared.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            debug!("stack closed");
            self.shared.readable.notify_all();
        }
        Ok(())
    }

    /// Compact head slack and reject every further mutation. Reads still
    /// succeed. Idempotent.
    pub fn freeze(&self) -> Result<(), StackError> {
        self.guard()?;
        let mut state = self.shared.state.lock().unwrap();
        if !state.frozen {
            let shift = state.store.compact();
            state.shift_hash(shift);
            state.frozen = true;
            debug!("stack frozen");
        }
        Ok(())
    }

    /// Switch the access perspective. Moving to Hash synthesises keys from
    /// positional indices for elements lacking one and rebuilds the index;
    /// moving away keeps the key buffer but drops the index.
    pub fn set_perspective(&self, perspective: Perspective) -> Result<(), StackError> {
        self.guard()?;
        let mut state = self.shared.state.lock().unwrap();
        state.ensure_mutable()?;
        state.switch_perspective(perspective);
        Ok(())
    }

    // ----- Crate internals -----

    pub(crate) fn guard(&self) -> Result<(), StackError> {
        if self.shared.guarded {
            fault::guard()
        } else {
            Ok(())
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Lock and expose the core. Views and bring use this to perform
    /// multi-step work under one critical section.
    pub(crate) fn lock_core(&self) -> std::sync::MutexGuard<'_, Core> {
        self.shared.state.lock().unwrap()
    }

    /// Wake one receiver after out-of-band insertion (bring, raw pushes).
    pub(crate) fn signal(&self) {
        self.shared.readable.notify_one();
    }

    pub(crate) fn capacity_raw(&self) -> usize {
        self.shared.capacity
    }

    pub(crate) fn elem_type_raw(&self) -> ElemType {
        self.shared.elem_type
    }
}

impl Core {
    pub(crate) fn perspective(&self) -> Perspective {
        self.perspective
    }

    pub(crate) fn ensure_mutable(&self) -> Result<(), StackError> {
        if self.frozen {
            Err(StackError::Frozen)
        } else {
            Ok(())
        }
    }

    /// Append under the stack-level push rules: key discipline per
    /// perspective, capacity cap, duplicate-key update in place.
    pub(crate) fn push_value(
        &mut self,
        capacity: usize,
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    ) -> Result<(), StackError> {
        self.ensure_mutable()?;
        match self.perspective {
            Perspective::Hash => {
                let key = key.ok_or(StackError::KeyRequired)?;
                if let Some(&slot) = self.hash.as_ref().and_then(|h| h.get(&key)) {
                    // Existing key: replace in place, position unchanged.
                    self.store.set(slot, value);
                    return Ok(());
                }
                if capacity > 0 && self.store.len() >= capacity {
                    return Err(StackError::Full);
                }
                let slot = self.store.push(value, Some(key.clone()));
                self.hash.get_or_insert_with(HashMap::new).insert(key, slot);
                Ok(())
            }
            _ => {
                if key.is_some() {
                    return Err(StackError::KeyRejected);
                }
                if capacity > 0 && self.store.len() >= capacity {
                    return Err(StackError::Full);
                }
                self.store.push(value, None);
                Ok(())
            }
        }
    }

    /// Map a perspective-interpreted offset to an absolute slot.
    pub(crate) fn slot_for(
        &self,
        perspective: Perspective,
        offset: usize,
    ) -> Result<usize, StackError> {
        let len = self.store.len();
        let logical = match perspective {
            Perspective::Lifo => offset
                .checked_add(1)
                .and_then(|o| len.checked_sub(o))
                .ok_or(StackError::OutOfRange(offset))?,
            Perspective::Fifo | Perspective::Indexed => offset,
            Perspective::Hash => return Err(StackError::KeyRequired),
        };
        self.store
            .slot_of(logical)
            .ok_or(StackError::OutOfRange(offset))
    }

    /// Positional removal with the O(1) fast paths: default LIFO pops the
    /// end, default FIFO advances the head, anything else shifts.
    pub(crate) fn pop_positional(
        &mut self,
        perspective: Perspective,
        offset: Option<usize>,
    ) -> Result<Vec<u8>, StackError> {
        if self.store.is_empty() {
            return Err(StackError::Empty);
        }
        match (perspective, offset.unwrap_or(0)) {
            (Perspective::Lifo, 0) => self.remove_back().ok_or(StackError::Empty),
            (Perspective::Fifo, 0) => self.remove_front().ok_or(StackError::Empty),
            (Perspective::Indexed, _) if offset.is_none() => {
                self.remove_back().ok_or(StackError::Empty)
            }
            (p, o) => {
                let slot = self.slot_for(p, o)?;
                self.remove_shift(slot).ok_or(StackError::OutOfRange(o))
            }
        }
    }

    pub(crate) fn peek_positional(
        &self,
        perspective: Perspective,
        offset: Option<usize>,
    ) -> Result<Vec<u8>, StackError> {
        if self.store.is_empty() {
            return Err(StackError::Empty);
        }
        let slot = match (perspective, offset) {
            (Perspective::Indexed, None) => self.slot_for(Perspective::Lifo, 0)?,
            (p, o) => self.slot_for(p, o.unwrap_or(0))?,
        };
        self.store
            .get(slot)
            .map(<[u8]>::to_vec)
            .ok_or(StackError::Empty)
    }

    pub(crate) fn pop_by_key(&mut self, key: &[u8]) -> Result<Vec<u8>, StackError> {
        let slot = self
            .hash
            .as_ref()
            .and_then(|h| h.get(key).copied())
            .ok_or_else(|| StackError::KeyMissing(lossy(key)))?;
        self.remove_tombstone(slot)
            .ok_or_else(|| StackError::KeyMissing(lossy(key)))
    }

    /// Live slot for `key` in the host's own index, when one exists.
    pub(crate) fn hash_slot(&self, key: &[u8]) -> Option<usize> {
        self.hash.as_ref().and_then(|h| h.get(key).copied())
    }

    pub(crate) fn peek_by_key(&self, key: &[u8]) -> Result<Vec<u8>, StackError> {
        let slot = self
            .hash
            .as_ref()
            .and_then(|h| h.get(key).copied())
            .ok_or_else(|| StackError::KeyMissing(lossy(key)))?;
        self.store
            .get(slot)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| StackError::KeyMissing(lossy(key)))
    }

    /// The element `take` delivers: head for FIFO, end for everything else.
    pub(crate) fn take_next(&mut self) -> Option<Vec<u8>> {
        self.take_next_entry().map(|(bytes, _)| bytes)
    }

    /// Like [`Core::take_next`] but keeps the removed element's key, which
    /// transfers into keyed destinations.
    pub(crate) fn take_next_entry(&mut self) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        match self.perspective {
            Perspective::Fifo => {
                let (bytes, key) = self.store.pop_front()?;
                self.unindex(key.as_deref());
                let shift = self.store.compact_if_slack();
                self.shift_hash(shift);
                Some((bytes, key))
            }
            _ => {
                let (bytes, key) = self.store.pop_back()?;
                self.unindex(key.as_deref());
                Some((bytes, key))
            }
        }
    }

    /// Slot the next `take`/`bring` would deliver, without removing it.
    pub(crate) fn top_slot(&self) -> Option<usize> {
        match self.perspective {
            Perspective::Fifo => self.store.slot_of(0),
            _ => self.store.last_slot(),
        }
    }

    // --- Removal primitives; every path keeps the hash index honest ---

    pub(crate) fn remove_back(&mut self) -> Option<Vec<u8>> {
        let (bytes, key) = self.store.pop_back()?;
        self.unindex(key.as_deref());
        Some(bytes)
    }

    pub(crate) fn remove_front(&mut self) -> Option<Vec<u8>> {
        let (bytes, key) = self.store.pop_front()?;
        self.unindex(key.as_deref());
        let shift = self.store.compact_if_slack();
        self.shift_hash(shift);
        Some(bytes)
    }

    /// O(n) removal at an absolute slot; later slots shift down by one.
    pub(crate) fn remove_shift(&mut self, slot: usize) -> Option<Vec<u8>> {
        let (bytes, key) = self.store.remove_at(slot)?;
        self.unindex(key.as_deref());
        if let Some(index) = self.hash.as_mut() {
            for v in index.values_mut() {
                if *v > slot {
                    *v -= 1;
                }
            }
        }
        Some(bytes)
    }

    /// Keyed removal: tombstone the slot, keep offsets stable.
    pub(crate) fn remove_tombstone(&mut self, slot: usize) -> Option<Vec<u8>> {
        let (bytes, key) = self.store.tombstone_at(slot)?;
        self.unindex(key.as_deref());
        Some(bytes)
    }

    fn unindex(&mut self, key: Option<&[u8]>) {
        if let (Some(index), Some(key)) = (self.hash.as_mut(), key) {
            index.remove(key);
        }
    }

    pub(crate) fn shift_hash(&mut self, shift: usize) {
        if shift > 0 {
            if let Some(index) = self.hash.as_mut() {
                for v in index.values_mut() {
                    *v -= shift;
                }
            }
        }
    }

    fn switch_perspective(&mut self, perspective: Perspective) {
        if perspective == self.perspective {
            return;
        }
        match perspective {
            Perspective::Hash => {
                // Synthesise keys from positional indices, then rebuild the
                // index over live slots only. Later duplicates win.
                let slots: Vec<usize> = self.store.live_slots().collect();
                let mut index = HashMap::with_capacity(slots.len());
                for (logical, slot) in slots.into_iter().enumerate() {
                    if self.store.key_at(slot).is_none() {
                        self.store.set_key(slot, logical.to_string().into_bytes());
                    }
                    if let Some(key) = self.store.key_at(slot) {
                        index.insert(key.to_vec(), slot);
                    }
                }
                self.hash = Some(index);
            }
            _ => {
                self.hash = None;
            }
        }
        self.perspective = perspective;
    }

    /// Ordered slots for traversal: LIFO walks from the cursor end toward
    /// the head, FIFO and Indexed walk from the cursor toward the end, Hash
    /// walks every live slot in buffer order.
    pub(crate) fn walk_slots(&self, perspective: Perspective, cursor: usize) -> Vec<usize> {
        let len = self.store.len();
        match perspective {
            Perspective::Lifo => (0..len.saturating_sub(cursor))
                .rev()
                .filter_map(|logical| self.store.slot_of(logical))
                .collect(),
            Perspective::Fifo | Perspective::Indexed => (cursor..len)
                .filter_map(|logical| self.store.slot_of(logical))
                .collect(),
            Perspective::Hash => self.store.live_slots().collect(),
        }
    }
}

fn lossy(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
