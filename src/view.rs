//! # View: Decoupled Cursors over a Shared Stack
//!
//! A [`View`] is an alternative access pattern onto one host stack: its own
//! perspective and its own cursor, independent of whatever perspective the
//! host currently runs. Two views with different perspectives over the same
//! stack are how work-stealing is expressed: a LIFO owner pops the newest
//! while a FIFO thief steals the oldest.
//!
//! ## Ownership
//! A view borrows its host through the stack's shared handle; it never owns
//! storage. Stacks know nothing about their views, so any number may attach
//! and a detach at any time leaves the host intact.
//!
//! ## Locking
//! Every operation takes the view's own small lock first and the host's
//! lock second, never the other way around. That fixed order is what makes
//! arbitrary stack/view graphs deadlock-free.
//!
//! ## Cursor
//! The cursor is interpreted relative to the view's perspective: offset
//! from the end for LIFO, offset from the head for FIFO, absolute position
//! for Indexed. Hash views have no cursor; cursor operations on them fail.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::trace;

use crate::error::StackError;
use crate::stack::{Perspective, Stack};

#[cfg(test)]
mod tests;

struct ViewState {
    host: Option<Stack>,
    cursor: usize,
    /// Private key lookup snapshot, rebuilt when attaching a hash view.
    lookup: Option<HashMap<Vec<u8>, usize>>,
}

/// A cursor with its own perspective, attached to at most one stack.
pub struct View {
    perspective: Perspective,
    state: Mutex<ViewState>,
}

impl View {
    /// Construct a detached view with the given perspective.
    pub fn new(perspective: Perspective) -> View {
        View {
            perspective,
            state: Mutex::new(ViewState {
                host: None,
                cursor: 0,
                lookup: None,
            }),
        }
    }

    pub fn perspective(&self) -> Perspective {
        self.perspective
    }

    /// Bind the view to a host stack and reset the cursor. Attaching a
    /// hash view snapshots a private key lookup. Idempotent: re-attaching
    /// to the same stack just rebuilds the snapshot.
    pub fn attach(&self, stack: &Stack) {
        let mut state = self.state.lock().unwrap();
        state.cursor = 0;
        state.lookup = if self.perspective == Perspective::Hash {
            let core = stack.lock_core();
            let mut lookup = HashMap::new();
            for slot in core.walk_slots(Perspective::Hash, 0) {
                if let Some(key) = core.store.key_at(slot) {
                    lookup.insert(key.to_vec(), slot);
                }
            }
            Some(lookup)
        } else {
            None
        };
        state.host = Some(stack.clone());
        trace!(perspective = %self.perspective, "view attached");
    }

    /// Unbind the view. Idempotent; the host is untouched.
    pub fn detach(&self) {
        let mut state = self.state.lock().unwrap();
        if state.host.take().is_some() {
            trace!("view detached");
        }
        state.cursor = 0;
        state.lookup = None;
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().unwrap().host.is_some()
    }

    // ----- Reads and removals through the view's perspective -----

    /// Read the element at the cursor without removing it.
    pub fn peek(&self) -> Result<Vec<u8>, StackError> {
        self.peek_shifted(None)
    }

    /// Read the element `offset` past the cursor (absolute position for an
    /// Indexed view).
    pub fn peek_at(&self, offset: usize) -> Result<Vec<u8>, StackError> {
        self.peek_shifted(Some(offset))
    }

    fn peek_shifted(&self, offset: Option<usize>) -> Result<Vec<u8>, StackError> {
        let state = self.state.lock().unwrap();
        let host = state.require_host()?;
        host.guard()?;
        if self.perspective == Perspective::Hash {
            return Err(StackError::KeyRequired);
        }
        let core = host.lock_core();
        core.peek_positional(self.perspective, Some(state.effective(self.perspective, offset)))
    }

    /// Read the element stored under `key` through a hash view.
    pub fn peek_key(&self, key: &[u8]) -> Result<Vec<u8>, StackError> {
        let state = self.state.lock().unwrap();
        let host = state.require_host()?;
        host.guard()?;
        let core = host.lock_core();
        let slot = state.resolve_key(&core, key)?;
        core.store
            .get(slot)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| StackError::KeyMissing(String::from_utf8_lossy(key).into_owned()))
    }

    /// Remove the element at the cursor: from the end of the host for a
    /// LIFO view, from the head for a FIFO view.
    pub fn pop(&self) -> Result<Vec<u8>, StackError> {
        self.pop_shifted(None)
    }

    /// Remove the element `offset` past the cursor (absolute position for
    /// an Indexed view).
    pub fn pop_at(&self, offset: usize) -> Result<Vec<u8>, StackError> {
        self.pop_shifted(Some(offset))
    }

    fn pop_shifted(&self, offset: Option<usize>) -> Result<Vec<u8>, StackError> {
        let state = self.state.lock().unwrap();
        let host = state.require_host()?;
        host.guard()?;
        if self.perspective == Perspective::Hash {
            return Err(StackError::KeyRequired);
        }
        let mut core = host.lock_core();
        core.ensure_mutable()?;
        core.pop_positional(
            self.perspective,
            Some(state.effective(self.perspective, offset)),
        )
    }

    /// Remove the element stored under `key` and delete the host's hash
    /// entry if present. The slot is tombstoned, keeping offsets stable for
    /// coexisting positional views.
    pub fn pop_key(&self, key: &[u8]) -> Result<Vec<u8>, StackError> {
        let mut state = self.state.lock().unwrap();
        let host = state.require_host()?.clone();
        host.guard()?;
        let mut core = host.lock_core();
        core.ensure_mutable()?;
        let slot = state.resolve_key(&core, key)?;
        let bytes = core
            .remove_tombstone(slot)
            .ok_or_else(|| StackError::KeyMissing(String::from_utf8_lossy(key).into_owned()))?;
        if let Some(lookup) = state.lookup.as_mut() {
            lookup.remove(key);
        }
        Ok(bytes)
    }

    // ----- Cursor management -----

    /// Step the cursor one element forward. Fails at the end of the live
    /// range and on hash views.
    pub fn advance(&self) -> Result<(), StackError> {
        if self.perspective == Perspective::Hash {
            return Err(StackError::NoCursor);
        }
        let mut state = self.state.lock().unwrap();
        let host = state.require_host()?.clone();
        let len = host.len();
        if state.cursor >= len {
            return Err(StackError::OutOfRange(state.cursor + 1));
        }
        state.cursor += 1;
        Ok(())
    }

    /// Rewind the cursor to the start of the view's order.
    pub fn reset(&self) {
        self.state.lock().unwrap().cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().unwrap().cursor
    }

    /// Position the cursor. Out-of-bounds positions fail rather than wrap;
    /// a position equal to the live length means "exhausted" and is
    /// allowed.
    pub fn set_cursor(&self, position: usize) -> Result<(), StackError> {
        if self.perspective == Perspective::Hash {
            return Err(StackError::NoCursor);
        }
        let mut state = self.state.lock().unwrap();
        let host = state.require_host()?.clone();
        let len = host.len();
        if position > len {
            return Err(StackError::OutOfRange(position));
        }
        state.cursor = position;
        Ok(())
    }

    /// Elements between the cursor and the end of the view's order.
    pub fn remaining(&self) -> Result<usize, StackError> {
        let state = self.state.lock().unwrap();
        let host = state.require_host()?;
        let len = host.len();
        Ok(match self.perspective {
            Perspective::Hash => len,
            _ => len.saturating_sub(state.cursor),
        })
    }

    // ----- Traversal -----

    /// Snapshot-style traversal: collect the ordered elements under the
    /// host's lock, release it, then apply `transform` to each element and
    /// push every result into `dest`. Transform failures are pushed onto
    /// `errors` (or dropped when absent) and traversal continues.
    ///
    /// A hash-perspective `dest` inherits each element's key where the
    /// source has one and synthesises a positional key otherwise.
    ///
    /// Returns the number of elements delivered to `dest`.
    pub fn walk(
        &self,
        mut transform: impl FnMut(&[u8]) -> Result<Vec<u8>, String>,
        dest: &Stack,
        errors: Option<&Stack>,
    ) -> Result<usize, StackError> {
        let entries = {
            let state = self.state.lock().unwrap();
            let host = state.require_host()?;
            host.snapshot_entries(self.perspective, state.cursor)?
        };
        Ok(crate::walk::deliver(dest, entries, &mut transform, errors))
    }
}

impl ViewState {
    fn require_host(&self) -> Result<&Stack, StackError> {
        self.host.as_ref().ok_or(StackError::Unattached)
    }

    /// Cursor-relative offset for positional perspectives; for an Indexed
    /// view the parameter is absolute and defaults to the cursor.
    fn effective(&self, perspective: Perspective, offset: Option<usize>) -> usize {
        match perspective {
            Perspective::Indexed => offset.unwrap_or(self.cursor),
            _ => self.cursor + offset.unwrap_or(0),
        }
    }

    /// Find the slot for `key`: the host's live index when it has one,
    /// otherwise the private snapshot, validated against the live store so
    /// a stale snapshot cannot resurrect a removed element.
    fn resolve_key(
        &self,
        core: &crate::stack::Core,
        key: &[u8],
    ) -> Result<usize, StackError> {
        let missing = || StackError::KeyMissing(String::from_utf8_lossy(key).into_owned());
        let slot = core
            .hash_slot(key)
            .or_else(|| self.lookup.as_ref().and_then(|l| l.get(key).copied()))
            .ok_or_else(missing)?;
        match core.store.key_at(slot) {
            Some(live) if live == key => Ok(slot),
            _ => Err(missing()),
        }
    }
}
