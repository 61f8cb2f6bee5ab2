//! # Raw Compute-Block Access
//!
//! Compute blocks are regions of generated code that hold the stack's mutex
//! for their whole body: parameters are popped into native locals once, the
//! body runs as straight-line or loop code, the result is pushed once, and
//! the lock is released. Per-access locking would dominate such bodies.
//!
//! The contract is with the compiler, not with people: within a compute
//! block the generated code must not suspend, must not re-enter any locking
//! stack operation, and must not call anything that could take another
//! stack's lock. [`Stack::compute`] is the only way to obtain a
//! [`RawStack`], which keeps the lock scope visible in the type.
//!
//! Raw operations skip the pending-error guard (checked once on entry),
//! the freeze check, and the capacity cap. They work on the end of the
//! buffer regardless of perspective, matching the parameter-passing
//! convention of compute codegen.

use super::{Core, Stack};
use crate::codec::ElemType;
use crate::error::StackError;

impl Stack {
    /// Run `body` with the stack's mutex held and raw access exposed.
    ///
    /// Checks the global error stack once, acquires the lock, runs the
    /// body, releases the lock, and signals receivers in case the body
    /// pushed. The body itself is trusted generated code; see the module
    /// docs for what it must not do.
    pub fn compute<T>(&self, body: impl FnOnce(&mut RawStack<'_>) -> T) -> Result<T, StackError> {
        self.guard()?;
        let out = {
            let mut state = self.lock_core();
            let mut raw = RawStack {
                core: &mut *state,
                elem_type: self.elem_type_raw(),
            };
            body(&mut raw)
        };
        self.signal();
        Ok(out)
    }
}

/// Unlocked operations on a stack whose mutex the caller already holds.
pub struct RawStack<'a> {
    core: &'a mut Core,
    elem_type: ElemType,
}

impl RawStack<'_> {
    /// Declared element type of the underlying stack.
    pub fn elem_type(&self) -> ElemType {
        self.elem_type
    }

    /// Live element count.
    pub fn len_raw(&self) -> usize {
        self.core.store.len()
    }

    /// Remove and return the newest element.
    pub fn pop_raw(&mut self) -> Option<Vec<u8>> {
        self.core.remove_back()
    }

    /// Append an element. No freeze or capacity checks; compute bodies
    /// push at most what they popped plus one result.
    pub fn push_raw(&mut self, bytes: Vec<u8>) {
        self.core.store.push(bytes, None);
    }

    /// Read the newest element without removing it.
    pub fn get_raw(&self) -> Option<&[u8]> {
        let slot = self.core.store.last_slot()?;
        self.core.store.get(slot)
    }

    /// Read the element at a logical offset from the head.
    pub fn get_at_raw(&self, offset: usize) -> Option<&[u8]> {
        let slot = self.core.store.slot_of(offset)?;
        self.core.store.get(slot)
    }

    /// Overwrite the element at a logical offset from the head. Returns
    /// false when the offset is out of range.
    pub fn set_raw(&mut self, offset: usize, bytes: Vec<u8>) -> bool {
        match self.core.store.slot_of(offset) {
            Some(slot) => {
                self.core.store.set(slot, bytes);
                true
            }
            None => false,
        }
    }
}
