//! # Tack Coordination Runtime
//!
//! The runtime library that programs compiled from the Tack source language
//! link against. Tack is stack-oriented: every value a program touches
//! lives in a typed container with a switchable access perspective, and
//! tasks coordinate by pushing, popping, and blocking on shared stacks.
//!
//! ## Layers
//! - [`codec`]: element types and the canonical byte encoding.
//! - [`stack`]: the container itself, with blocking handoff, freeze/close
//!   lifecycle, and the compute-block raw path.
//! - [`view`]: decoupled cursors giving concurrent agents independent
//!   perspectives over one stack.
//! - [`bring`]: atomic cross-container transfer with type conversion.
//! - [`walk`]: non-destructive map/filter/reduce traversal.
//! - [`worksteal`]: a bounded work-stealing deque, and the same pattern
//!   built purely from a stack plus two views.
//! - [`coordinate`]: `expect`/`select`/`consider`, the multi-source waits.
//! - [`fault`]: the process-wide error stack that gates every operation.
//! - [`context`] and [`spawn`]: cancellation and task launch.
//!
//! ## The forcing function
//! Any error a program leaves unhandled on the global error stack fails the
//! next stack operation before it touches state. Compiled programs clear
//! errors only through `consider`'s error arm. See [`fault`].

pub mod bring;
pub mod codec;
pub mod context;
pub mod coordinate;
mod error;
pub mod fault;
pub mod spawn;
pub mod stack;
mod store;
pub mod view;
pub mod walk;
pub mod worksteal;

pub use codec::ElemType;
pub use context::Context;
pub use coordinate::{consider, expect, select, Considered, Quorum, Status};
pub use error::StackError;
pub use stack::{Perspective, RawStack, Stack};
pub use view::View;
pub use walk::reduce;
pub use worksteal::{Task, TaskDeque, WorkStealStack};
