//! # Spawn Runtime Hooks
//!
//! The "launch a concurrent task" surface generated programs and the
//! coordination helpers use. The runtime does not schedule anything itself;
//! tasks are host OS threads, and a [`TaskHandle`] is the join point the
//! generated code holds for structured teardown.

use std::thread;

use tracing::error;

/// Handle to a launched task.
pub struct TaskHandle {
    inner: thread::JoinHandle<()>,
}

impl TaskHandle {
    /// Wait for the task to finish. A panicked task is reported and
    /// otherwise absorbed; the panic belongs to the task, not the joiner.
    pub fn join(self) {
        if self.inner.join().is_err() {
            error!("task panicked");
        }
    }
}

/// Launch a concurrent task.
pub fn spawn<F>(f: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    spawn_named("task", f)
}

/// Launch a concurrent task with a name that shows up in thread listings
/// and panic messages.
pub fn spawn_named<F>(name: &str, f: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    let inner = thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .unwrap_or_else(|err| panic!("failed to launch task {name:?}: {err}"));
    TaskHandle { inner }
}
