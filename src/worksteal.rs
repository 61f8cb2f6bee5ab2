//! # Work-Stealing
//!
//! Two interoperable constructions of the same coordination pattern.
//!
//! ## Traditional deque
//! [`TaskDeque`] is a bounded ring with an owner end and a thief end. The
//! owner pushes and pops at `bottom` without a lock; thieves serialise on a
//! mutex and advance `top` with a compare-and-swap. The only owner CAS is
//! the single-element race: the owner speculatively publishes the
//! decremented `bottom`, reads `top`, and if exactly one element remains,
//! owner and thief settle it with one CAS on `top`. The loser restores the
//! indices and reports empty.
//!
//! ## View-based construction
//! [`WorkStealStack`] is a capped [`Stack`] with a pre-attached LIFO owner
//! view and FIFO thief view, plus a pool of element-sized buffers recycled
//! through push and pop so the steady state allocates nothing. It exists to
//! show the pattern needs no mechanism beyond stacks and views.
//!
//! Neither construction orders thieves among themselves; both guarantee
//! that a non-empty deque with a live party makes progress.
//!
//! ## Safety (ring slots)
//! Ring slots are `UnsafeCell` because the owner writes them without a
//! lock. The aliasing discipline: a slot is written only by the owner's
//! `push`, and only at an index outside the live range `[top, bottom)`
//! (full deques refuse the push). Racing `pop`/`steal` readers clone the
//! slot before the CAS decides the winner, so the race itself is
//! read-only. A slot is rewritten only once the ring has wrapped, so a
//! write can overlap a thief's in-flight read only if the owner completes
//! `capacity` pushes inside the thief's few-instruction critical section;
//! size the ring accordingly. `push`/`pop` must come from one thread, the
//! owner; `steal` may come from any number of threads.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Mutex;

use crate::codec::ElemType;
use crate::error::StackError;
use crate::stack::{Perspective, Stack};
use crate::view::View;

#[cfg(test)]
mod tests;

/// A unit of stealable work: an identifier plus an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub payload: Vec<u8>,
}

/// Bounded work-stealing deque: lock-free owner end, mutex-serialised
/// thief end.
pub struct TaskDeque {
    ring: Box<[UnsafeCell<Option<Task>>]>,
    /// Owner end. Only the owner thread stores it outside the races
    /// described in the module docs.
    bottom: AtomicIsize,
    /// Thief end, advanced by CAS.
    top: AtomicIsize,
    steal_lock: Mutex<()>,
}

// Slot access follows the aliasing discipline in the module docs; the
// indices and the steal mutex provide the synchronisation.
unsafe impl Send for TaskDeque {}
unsafe impl Sync for TaskDeque {}

impl TaskDeque {
    /// A deque holding at most `capacity` tasks.
    pub fn with_capacity(capacity: usize) -> TaskDeque {
        let ring = (0..capacity.max(1))
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        TaskDeque {
            ring,
            bottom: AtomicIsize::new(0),
            top: AtomicIsize::new(0),
            steal_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub fn len(&self) -> usize {
        let b = self.bottom.load(Ordering::SeqCst);
        let t = self.top.load(Ordering::SeqCst);
        (b - t).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, index: isize) -> *mut Option<Task> {
        self.ring[index.rem_euclid(self.ring.len() as isize) as usize].get()
    }

    /// Owner: append a task at the bottom. Fails when the ring is full.
    pub fn push(&self, task: Task) -> Result<(), StackError> {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        if (b - t) as usize >= self.ring.len() {
            return Err(StackError::Full);
        }
        unsafe {
            *self.slot(b) = Some(task);
        }
        self.bottom.store(b + 1, Ordering::Release);
        Ok(())
    }

    /// Owner: remove the newest task. The common case takes no lock and no
    /// CAS; the single-element case races one thief over `top`.
    pub fn pop(&self) -> Option<Task> {
        let b = self.bottom.load(Ordering::Relaxed) - 1;
        // Publish the claim before reading top.
        self.bottom.store(b, Ordering::SeqCst);
        let t = self.top.load(Ordering::SeqCst);
        if t > b {
            // Raced empty: restore and fail.
            self.bottom.store(t, Ordering::SeqCst);
            return None;
        }
        let task = unsafe { (*self.slot(b)).clone() };
        if t == b {
            // Last element: exactly one of owner/thief advances top.
            let won = self
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            self.bottom.store(b + 1, Ordering::SeqCst);
            if !won {
                return None;
            }
        }
        task
    }

    /// Thief: remove the oldest task. Thieves serialise on the mutex; the
    /// CAS on `top` resolves the race with an owner popping the same last
    /// element.
    pub fn steal(&self) -> Option<Task> {
        let _serial = self.steal_lock.lock().unwrap();
        let t = self.top.load(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::SeqCst);
        if t >= b {
            return None;
        }
        let task = unsafe { (*self.slot(t)).clone() };
        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            task
        } else {
            None
        }
    }
}

/// Work-stealing expressed with the runtime's own primitives: one capped
/// stack, a LIFO owner view, a FIFO thief view, and a buffer pool.
pub struct WorkStealStack {
    stack: Stack,
    owner: View,
    thief: View,
    pool: Mutex<Vec<Vec<u8>>>,
}

/// Pool buffer size for variable-width element types.
const LOOSE_BUF: usize = 64;

impl WorkStealStack {
    /// A work queue of at most `capacity` elements of `elem_type`, with its
    /// buffer ring preallocated.
    pub fn new(elem_type: ElemType, capacity: usize) -> WorkStealStack {
        let stack = Stack::with_capacity(elem_type, Perspective::Lifo, capacity);
        let owner = View::new(Perspective::Lifo);
        let thief = View::new(Perspective::Fifo);
        owner.attach(&stack);
        thief.attach(&stack);
        let width = elem_type.fixed_size().unwrap_or(LOOSE_BUF);
        let pool = (0..capacity).map(|_| Vec::with_capacity(width)).collect();
        WorkStealStack {
            stack,
            owner,
            thief,
            pool: Mutex::new(pool),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The backing stack, for attaching further views or diagnostics.
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Owner: enqueue a value. The bytes land in a pooled buffer, so the
    /// steady state does not allocate.
    pub fn push(&self, value: &[u8]) -> Result<(), StackError> {
        let mut buf = self.pool.lock().unwrap().pop().unwrap_or_default();
        buf.clear();
        buf.extend_from_slice(value);
        self.stack.push(buf)
    }

    /// Owner: dequeue the newest element. `Ok(None)` when empty.
    pub fn pop(&self) -> Result<Option<Vec<u8>>, StackError> {
        match self.owner.pop() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StackError::Empty) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Thief: dequeue the oldest element. `Ok(None)` when empty.
    pub fn steal(&self) -> Result<Option<Vec<u8>>, StackError> {
        match self.thief.pop() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StackError::Empty) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Hand a consumed buffer back to the pool.
    pub fn recycle(&self, buf: Vec<u8>) {
        let mut pool = self.pool.lock().unwrap();
        if pool.len() < self.stack.capacity() {
            pool.push(buf);
        }
    }
}
