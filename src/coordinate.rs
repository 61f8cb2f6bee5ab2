//! # Multi-Source Coordination
//!
//! The helpers behind source-level `.expect(n)`, `.select()`, and
//! `.consider()`. One blocking receiver task is spawned per source stack,
//! all sharing a cancellable [`Context`] and funnelling results into a
//! bounded channel. The caller accumulates successes until the threshold is
//! met, then cancels the context so the stragglers abandon their blocking
//! receives; every receiver is joined before control returns, so no task
//! outlives its wait.
//!
//! - threshold 1 is a pure select,
//! - threshold N is a barrier,
//! - anything between is a quorum.
//!
//! Arrival order is the wall-clock order in which receives completed, not
//! the declaration order of the sources, and each arrival keeps the index
//! of the source that produced it so dispatch can branch on origin.
//!
//! Timeouts are cancellation with a deadline: the partial results gathered
//! before the deadline are returned with [`Status::Timeout`].

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::debug;

use crate::codec::ElemType;
use crate::context::Context;
use crate::error::StackError;
use crate::fault;
use crate::spawn;
use crate::stack::{Perspective, Stack};


/// Outcome of a multi-source wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The threshold was met.
    Ok,
    /// The deadline passed first; partial results are preserved.
    Timeout,
    /// Enough sources failed that the threshold became unreachable.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::Timeout => "timeout",
            Status::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result of [`expect`]: the first arrivals in arrival order plus the
/// identity of the source behind each.
pub struct Quorum {
    pub status: Status,
    /// FIFO bytes stack of the gathered values; reading it front to back
    /// replays arrival order.
    pub results: Stack,
    /// `origins[i]` is the index of the source that produced arrival `i`.
    pub origins: Vec<usize>,
}

/// Wait until `threshold` of the `sources` have produced one element each.
///
/// Each source is drained by a dedicated blocking receiver sharing one
/// cancellable context. As soon as the threshold is met, or the timeout
/// expires, or too many sources fail for the threshold to be reachable,
/// the context is cancelled and every receiver is joined.
pub fn expect(
    sources: &[Stack],
    threshold: usize,
    timeout: Option<Duration>,
) -> Result<Quorum, StackError> {
    run_expect(sources, threshold, timeout).map(|(quorum, _)| quorum)
}

/// Wait for whichever source speaks first. Returns the winning source's
/// index and its value; the remaining receivers are cancelled.
pub fn select(sources: &[Stack], timeout: Option<Duration>) -> Result<(usize, Vec<u8>), StackError> {
    let (quorum, first_failure) = run_expect(sources, 1, timeout)?;
    match quorum.status {
        Status::Ok => {
            let value = quorum.results.pop()?;
            Ok((quorum.origins[0], value))
        }
        Status::Timeout => Err(StackError::Timeout),
        Status::Error => Err(first_failure.unwrap_or(StackError::Empty)),
    }
}

fn run_expect(
    sources: &[Stack],
    threshold: usize,
    timeout: Option<Duration>,
) -> Result<(Quorum, Option<StackError>), StackError> {
    fault::guard()?;
    if threshold > sources.len() {
        return Err(StackError::Threshold(threshold, sources.len()));
    }

    let ctx = match timeout {
        Some(t) => Context::with_timeout(t),
        None => Context::background(),
    };
    let deadline = timeout.map(|t| Instant::now() + t);

    let (tx, rx) = bounded::<(usize, Result<Vec<u8>, StackError>)>(sources.len());
    let mut receivers = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let source = source.clone();
        let ctx = ctx.clone();
        let tx = tx.clone();
        receivers.push(spawn::spawn_named("expect-receiver", move || {
            let outcome = source.take_ctx(&ctx, None);
            // The channel is bounded at the source count, so this send
            // never blocks; a receiver that lost the race just drops out.
            let _ = tx.send((index, outcome));
        }));
    }
    drop(tx);

    let mut arrivals: Vec<(usize, Vec<u8>)> = Vec::with_capacity(threshold);
    let mut failed = 0usize;
    let mut first_failure = None;
    let mut status = Status::Ok;

    while arrivals.len() < threshold {
        let message = match deadline {
            Some(at) => rx.recv_deadline(at),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match message {
            Ok((index, Ok(bytes))) => arrivals.push((index, bytes)),
            Ok((index, Err(StackError::Cancelled))) => {
                // A straggler observing our own cancellation; not a failure.
                debug!(source = index, "receiver cancelled");
            }
            Ok((index, Err(err))) => {
                debug!(source = index, error = %err, "source failed");
                failed += 1;
                first_failure.get_or_insert(err);
                if sources.len() - failed < threshold {
                    status = Status::Error;
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                status = Status::Timeout;
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Every receiver has reported. With the threshold unmet the
                // wait ended either on the context deadline or on failures.
                status = if arrivals.len() >= threshold {
                    Status::Ok
                } else if ctx.is_cancelled() {
                    Status::Timeout
                } else {
                    Status::Error
                };
                break;
            }
        }
    }

    ctx.cancel();
    for receiver in receivers {
        receiver.join();
    }
    debug!(
        gathered = arrivals.len(),
        threshold,
        %status,
        "expect settled"
    );

    let results = Stack::new(ElemType::Bytes, Perspective::Fifo);
    let mut origins = Vec::with_capacity(arrivals.len());
    for (index, bytes) in arrivals {
        results.push(bytes)?;
        origins.push(index);
    }
    Ok((
        Quorum {
            status,
            results,
            origins,
        },
        first_failure,
    ))
}

/// Resolved branch of a `consider`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Considered {
    /// The global error stack was empty; run the `ok` arm.
    Ok,
    /// Exactly one error was popped off the global error stack; the bytes
    /// bind in the `error` arm's scope.
    Error(Vec<u8>),
    /// The preceding wait timed out.
    Timeout,
}

/// Resolve which `consider` arm runs after an operation with the given
/// status. The `ok` arm is reachable only with an empty global error
/// stack; the `error` arm pops exactly one pending error.
pub fn consider(status: Status) -> Considered {
    match status {
        Status::Timeout => Considered::Timeout,
        Status::Error => Considered::Error(fault::take_error().unwrap_or_default()),
        Status::Ok => match fault::take_error() {
            Some(bytes) => Considered::Error(bytes),
            None => Considered::Ok,
        },
    }
}
