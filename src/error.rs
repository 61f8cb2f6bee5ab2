//! # Error Handling for the Tack Runtime
//!
//! This module defines [`StackError`], the single error enum used throughout
//! the coordination runtime. Every fallible operation on stacks, views,
//! transfers, and the multi-source helpers returns `Result<T, StackError>`.
//!
//! ## Design
//! - One variant per failure category, mirroring the runtime's taxonomy:
//!   precondition violations (empty pop, missing key, frozen mutation),
//!   coordination outcomes (timeout, closed, cancelled), type-transfer
//!   failures (unparseable string, unsupported conversion pair), and the
//!   programmer fault of leaving the global error stack unhandled.
//! - `PartialEq` is derived so tests can assert on exact error values.
//! - Messages are written for the program author: the text of a
//!   `StackError` is what a Tack program sees when the error reaches the
//!   global error stack.
//!
//! ## Propagation
//! Each entry point returns its error directly to the caller. Generated code
//! typically pushes the message onto the global error stack (see
//! [`crate::fault`]) and lets a later `consider` branch observe it.

use thiserror::Error;

use crate::codec::ElemType;

/// Errors surfaced by the coordination runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// Pop or peek on a stack with no live elements.
    #[error("stack is empty")]
    Empty,
    /// Mutating operation on a frozen stack.
    #[error("stack is frozen")]
    Frozen,
    /// Push on a stack whose capacity is reached.
    #[error("stack is full")]
    Full,
    /// Blocking receive on a closed stack that has drained.
    #[error("stack is closed")]
    Closed,
    /// Blocking receive gave up after its deadline.
    #[error("timed out waiting for an element")]
    Timeout,
    /// Blocking receive abandoned because its context was cancelled.
    #[error("wait cancelled")]
    Cancelled,
    /// Positional parameter outside the live element range.
    #[error("offset {0} is out of range")]
    OutOfRange(usize),
    /// Hash lookup for a key that is absent or tombstoned.
    #[error("key not found: {0}")]
    KeyMissing(String),
    /// Hash-perspective operation invoked without a key.
    #[error("hash perspective requires a key")]
    KeyRequired,
    /// Keyed push into a positional perspective.
    #[error("positional perspective does not accept a key")]
    KeyRejected,
    /// View operation before `attach` (or after `detach`).
    #[error("view is not attached to a stack")]
    Unattached,
    /// Cursor operation on a hash-perspective view.
    #[error("hash perspective has no cursor")]
    NoCursor,
    /// Element bytes are not a valid encoding of the declared type.
    #[error("invalid encoding for element type {0}")]
    Encoding(ElemType),
    /// String input that does not parse as the requested numeric type.
    #[error("cannot parse {0:?} as {1}")]
    Parse(String, ElemType),
    /// Transfer between types with no defined conversion.
    #[error("no conversion from {0} to {1}")]
    Unconvertible(ElemType, ElemType),
    /// Numeric base outside the supported range for string parsing.
    #[error("unsupported numeric base {0}")]
    BadRadix(u32),
    /// `expect` threshold larger than the number of sources.
    #[error("threshold {0} exceeds source count {1}")]
    Threshold(usize, usize),
    /// A prior error is still pending on the global error stack. The payload
    /// is the text of the most recent unhandled error.
    #[error("unhandled error pending: {0}")]
    ErrorsPending(String),
}
