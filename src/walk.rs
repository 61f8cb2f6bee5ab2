//! # Walk, Filter, Reduce
//!
//! Non-destructive traversal utilities over a source stack in its current
//! perspective order. `walk_from` and `filter_from` are methods on the
//! destination stack, mirroring how compiled programs phrase them; `reduce`
//! is a standalone fold.
//!
//! All three take a snapshot under the source's lock, release it, and only
//! then invoke the user-supplied function, so user code never runs inside a
//! critical section. Failures from the user function are forwarded to the
//! caller's error stack, or dropped when none is supplied, and traversal
//! continues past them.

use crate::error::StackError;
use crate::stack::{Perspective, Stack};

impl Stack {
    /// Feed every element of `src` (in `src`'s perspective order) through
    /// `transform` and push the results into this stack. Returns the number
    /// of elements delivered.
    pub fn walk_from(
        &self,
        src: &Stack,
        mut transform: impl FnMut(&[u8]) -> Result<Vec<u8>, String>,
        errors: Option<&Stack>,
    ) -> Result<usize, StackError> {
        let entries = src.snapshot_entries(src.perspective(), 0)?;
        Ok(deliver(self, entries, &mut transform, errors))
    }

    /// Copy the elements of `src` for which `keep` returns true into this
    /// stack, in `src`'s perspective order. Returns the number kept.
    pub fn filter_from(
        &self,
        src: &Stack,
        mut keep: impl FnMut(&[u8]) -> Result<bool, String>,
        errors: Option<&Stack>,
    ) -> Result<usize, StackError> {
        let entries = src.snapshot_entries(src.perspective(), 0)?;
        let mut kept = 0usize;
        for (bytes, key) in entries {
            match keep(&bytes) {
                Ok(true) => {
                    if push_entry(self, bytes, key, kept, errors) {
                        kept += 1;
                    }
                }
                Ok(false) => {}
                Err(msg) => sideline(errors, &msg),
            }
        }
        Ok(kept)
    }
}

/// Fold the elements of `src` in perspective order into an accumulator.
/// Elements whose fold step fails are skipped; the failure goes to
/// `errors` when supplied.
pub fn reduce(
    src: &Stack,
    init: Vec<u8>,
    mut fold: impl FnMut(&[u8], &[u8]) -> Result<Vec<u8>, String>,
    errors: Option<&Stack>,
) -> Result<Vec<u8>, StackError> {
    let entries = src.snapshot_entries(src.perspective(), 0)?;
    let mut acc = init;
    for (bytes, _) in entries {
        match fold(&acc, &bytes) {
            Ok(next) => acc = next,
            Err(msg) => sideline(errors, &msg),
        }
    }
    Ok(acc)
}

/// Push transformed entries into `dest`, sidelining transform and push
/// failures. Shared with [`crate::view::View::walk`]. Returns the number
/// delivered.
pub(crate) fn deliver(
    dest: &Stack,
    entries: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    transform: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>, String>,
    errors: Option<&Stack>,
) -> usize {
    let mut delivered = 0usize;
    for (bytes, key) in entries {
        match transform(&bytes) {
            Ok(out) => {
                if push_entry(dest, out, key, delivered, errors) {
                    delivered += 1;
                }
            }
            Err(msg) => sideline(errors, &msg),
        }
    }
    delivered
}

/// Push one element, inheriting the source key into a hash destination or
/// synthesising a positional one. Returns true when the push landed.
fn push_entry(
    dest: &Stack,
    bytes: Vec<u8>,
    key: Option<Vec<u8>>,
    position: usize,
    errors: Option<&Stack>,
) -> bool {
    let outcome = if dest.perspective() == Perspective::Hash {
        let key = key.unwrap_or_else(|| position.to_string().into_bytes());
        dest.push_keyed(bytes, key)
    } else {
        dest.push(bytes)
    };
    match outcome {
        Ok(()) => true,
        Err(err) => {
            sideline(errors, &err.to_string());
            false
        }
    }
}

pub(crate) fn sideline(errors: Option<&Stack>, message: &str) {
    if let Some(stack) = errors {
        let _ = stack.push(message.as_bytes().to_vec());
    }
}
