//! # Bring: Atomic Cross-Container Transfer
//!
//! `bring` moves the top element of a source stack into a destination
//! stack, converting its bytes between element types when the two disagree,
//! as one indivisible step. Either the source loses its top and the
//! destination gains the converted value, or both stacks are exactly as
//! they were; no concurrent observer of either endpoint can see an
//! in-between state.
//!
//! ## Conversion table
//! Dispatch is a tagged match over the `(source, destination)` type pair:
//!
//! ```text
//! same type        byte copy
//! int <-> float    numeric conversion, float truncates toward zero
//! int <-> uint     bit-pattern reinterpretation
//! str  -> numeric  parse, optional base (default 10)
//! numeric -> str   decimal rendering
//! bool <-> int     false = 0, true = 1; nonzero is true
//! bytes <-> str    identity (str side must be valid UTF-8)
//! anything else    no conversion defined
//! ```
//!
//! ## Commit protocol
//! The conversion is staged from a peek, the destination insert happens
//! first, and the source removal last, all under both stacks' mutexes
//! acquired in canonical (shared-state address) order. The fixed order
//! keeps concurrent brings over the same pair of stacks deadlock-free, and
//! any failure (empty source, undefined conversion, frozen or full
//! destination) returns before either stack has changed.

use std::sync::Arc;

use crate::codec::{self, ElemType};
use crate::error::StackError;
use crate::stack::{Perspective, Stack};

impl Stack {
    /// Transfer the top of `src` into this stack, converting between the
    /// two element types. String-to-numeric parses use base 10.
    pub fn bring(&self, src: &Stack) -> Result<(), StackError> {
        self.bring_inner(src, None)
    }

    /// Like [`Stack::bring`] with an explicit numeric base for
    /// string-to-integer parses. Bases 2 through 36 are supported.
    pub fn bring_radix(&self, src: &Stack, radix: u32) -> Result<(), StackError> {
        self.bring_inner(src, Some(radix))
    }

    fn bring_inner(&self, src: &Stack, radix: Option<u32>) -> Result<(), StackError> {
        self.guard()?;
        if self.same_stack(src) {
            return self.bring_onto_self();
        }

        // Canonical lock order by shared-state address, so two brings in
        // opposite directions over the same pair cannot deadlock.
        let dst_first = (Arc::as_ptr(self.shared()) as usize) < (Arc::as_ptr(src.shared()) as usize);
        let (mut src_core, mut dst_core) = if dst_first {
            let d = self.lock_core();
            let s = src.lock_core();
            (s, d)
        } else {
            let s = src.lock_core();
            let d = self.lock_core();
            (s, d)
        };

        src_core.ensure_mutable()?;
        dst_core.ensure_mutable()?;

        let top = src_core.top_slot().ok_or(StackError::Empty)?;
        let bytes = src_core
            .store
            .get(top)
            .map(<[u8]>::to_vec)
            .ok_or(StackError::Empty)?;
        let converted = convert(src.elem_type(), self.elem_type(), &bytes, radix)?;

        let key = if dst_core.perspective() == Perspective::Hash {
            Some(
                src_core
                    .store
                    .key_at(top)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|| dst_core.store.len().to_string().into_bytes()),
            )
        } else {
            None
        };

        // Insert first: a destination-side failure leaves the source
        // untouched. With both locks held the double-presence window is
        // unobservable.
        dst_core.push_value(self.capacity_raw(), converted, key)?;
        let removed = src_core.take_next_entry();
        debug_assert!(removed.is_some());

        drop(src_core);
        drop(dst_core);
        self.signal();
        Ok(())
    }

    /// Degenerate same-stack transfer: one lock, pop then re-push.
    fn bring_onto_self(&self) -> Result<(), StackError> {
        {
            let mut core = self.lock_core();
            core.ensure_mutable()?;
            if core.store.is_empty() {
                return Err(StackError::Empty);
            }
            let (bytes, key) = core.take_next_entry().ok_or(StackError::Empty)?;
            // Cannot fail: the pop freed one capacity slot and the key
            // travels with the element.
            core.push_value(self.capacity_raw(), bytes, key)?;
        }
        self.signal();
        Ok(())
    }
}

/// Convert `bytes` from one element encoding to another. Fails without
/// side effects for pairs outside the table and for malformed input.
pub(crate) fn convert(
    src: ElemType,
    dst: ElemType,
    bytes: &[u8],
    radix: Option<u32>,
) -> Result<Vec<u8>, StackError> {
    use ElemType::*;

    if src == dst {
        return Ok(bytes.to_vec());
    }
    match (src, dst) {
        // Numeric conversions.
        (Int, Float) => Ok(codec::encode_float(codec::decode_int(bytes)? as f64)),
        (Uint, Float) => Ok(codec::encode_float(codec::decode_uint(bytes)? as f64)),
        (Float, Int) => Ok(codec::encode_int(codec::decode_float(bytes)? as i64)),
        (Float, Uint) => Ok(codec::encode_uint(codec::decode_float(bytes)? as u64)),
        // Signedness reinterpretation keeps the bit pattern.
        (Int, Uint) | (Uint, Int) => Ok(bytes.to_vec()),

        // String parses, with an optional base for the integer forms.
        (Str, Int) => {
            let text = codec::decode_str(bytes)?;
            let value = i64::from_str_radix(&text, checked_radix(radix)?)
                .map_err(|_| StackError::Parse(text, Int))?;
            Ok(codec::encode_int(value))
        }
        (Str, Uint) => {
            let text = codec::decode_str(bytes)?;
            let value = u64::from_str_radix(&text, checked_radix(radix)?)
                .map_err(|_| StackError::Parse(text, Uint))?;
            Ok(codec::encode_uint(value))
        }
        (Str, Float) => {
            if checked_radix(radix)? != 10 {
                return Err(StackError::BadRadix(radix.unwrap_or(10)));
            }
            let text = codec::decode_str(bytes)?;
            let value = text
                .parse::<f64>()
                .map_err(|_| StackError::Parse(text, Float))?;
            Ok(codec::encode_float(value))
        }

        // Decimal renderings.
        (Int, Str) => Ok(codec::decode_int(bytes)?.to_string().into_bytes()),
        (Uint, Str) => Ok(codec::decode_uint(bytes)?.to_string().into_bytes()),
        (Float, Str) => Ok(codec::decode_float(bytes)?.to_string().into_bytes()),

        // Boolean bridging.
        (Bool, Int) => Ok(codec::encode_int(codec::decode_bool(bytes)? as i64)),
        (Int, Bool) => Ok(codec::encode_bool(codec::decode_int(bytes)? != 0)),

        // Bytes and strings share their representation; the string side
        // still has to be valid UTF-8.
        (Bytes, Str) => {
            codec::validate(Str, bytes)?;
            Ok(bytes.to_vec())
        }
        (Str, Bytes) => Ok(bytes.to_vec()),

        (s, d) => Err(StackError::Unconvertible(s, d)),
    }
}

fn checked_radix(radix: Option<u32>) -> Result<u32, StackError> {
    match radix {
        None => Ok(10),
        Some(r) if (2..=36).contains(&r) => Ok(r),
        Some(r) => Err(StackError::BadRadix(r)),
    }
}
