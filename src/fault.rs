//! # Global Error Stack
//!
//! A single process-wide LIFO bytes stack holding error descriptions, most
//! recent on top. It is the language-level surface for failures: generated
//! code pushes error text here and returns control, and a later `consider`
//! either runs its `ok` arm (error stack empty) or pops exactly one error
//! into its `error` arm.
//!
//! ## The forcing function
//! Every guarded stack entry point calls [`guard`] first. While an error is
//! pending, the operation fails with [`StackError::ErrorsPending`] carrying
//! the top error's text, before touching any stack state. Unhandled
//! failures therefore cannot sit silently in the system; they poison the
//! next stack operation, and a generated `main` propagates the fault and
//! exits nonzero.
//!
//! The error stack itself is constructed unguarded, otherwise it could
//! never be read or cleared while an error is pending. Its lifetime is the
//! process lifetime.

use once_cell::sync::Lazy;
use tracing::error;

use crate::codec::ElemType;
use crate::error::StackError;
use crate::stack::{Perspective, Stack};

/// Process-wide error stack, installed on first touch.
static ERRORS: Lazy<Stack> = Lazy::new(|| Stack::unguarded(ElemType::Bytes, Perspective::Lifo));

/// Handle to the global error stack. Generated code uses this for
/// `@error > push(...)` and for explicit drain loops.
pub fn error_stack() -> &'static Stack {
    &ERRORS
}

/// Push an error description onto the global error stack.
pub fn raise(message: &str) {
    error!("error raised: {message}");
    // The error stack is unguarded, unbounded, and never frozen, so the
    // push cannot fail.
    let _ = ERRORS.push(message.as_bytes().to_vec());
}

/// Number of pending errors.
pub fn pending() -> usize {
    ERRORS.len()
}

/// Pop the most recent error, if any. `consider` uses this to bind the
/// error-branch value; this is the only sanctioned way to clear errors.
pub fn take_error() -> Option<Vec<u8>> {
    ERRORS.pop().ok()
}

/// Fail fast when errors are pending. Called first by every guarded stack
/// entry point.
pub(crate) fn guard() -> Result<(), StackError> {
    match ERRORS.peek() {
        Ok(top) => Err(StackError::ErrorsPending(
            String::from_utf8_lossy(&top).into_owned(),
        )),
        Err(_) => Ok(()),
    }
}

// Tests for the forcing function live in tests/scenarios.rs: the error
// stack is process-wide, and a transiently raised error would poison
// unrelated unit tests running in parallel in this binary.
