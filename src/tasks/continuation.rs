//! # One-shot completion callback.
//!
//! A [`Continuation`] hands a [`Task`] back to whoever forwarded it, together
//! with a flag telling whether the completion happened **synchronously**
//! (on the stack of the `process` call that received the task) or later,
//! from another thread or runtime worker.
//!
//! ## Rules
//! - A continuation is consumed by [`Continuation::complete`], so it fires at most once.
//! - Every handler must complete the continuation it receives, eventually.
//! - Dropping a continuation without completing it stalls its task; the
//!   dispatch core never does that.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use taskmux::{Continuation, Task};
//!
//! let seen = Arc::new(Mutex::new(None));
//! let slot = Arc::clone(&seen);
//! let done = Continuation::new(move |task: Task, sync| {
//!     *slot.lock().unwrap() = Some((task.id(), sync));
//! });
//!
//! let task = Task::new(());
//! let id = task.id();
//! done.complete(task, true);
//! assert_eq!(*seen.lock().unwrap(), Some((id, true)));
//! ```

use std::fmt;

use tokio::sync::oneshot;

use crate::tasks::Task;

type Callback = Box<dyn FnOnce(Task, bool) + Send + 'static>;

/// One-shot completion callback carrying the task back to its caller.
pub struct Continuation {
    callback: Callback,
}

impl Continuation {
    /// Wraps a closure receiving the completed task and the synchronous flag.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Task, bool) + Send + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Creates a continuation that forwards the completed task into a oneshot channel.
    ///
    /// The receiver yields the task once the continuation fires. The synchronous
    /// flag is dropped; awaiting callers do not need it.
    pub fn channel() -> (Self, oneshot::Receiver<Task>) {
        let (tx, rx) = oneshot::channel();
        let done = Self::new(move |task, _sync| {
            let _ = tx.send(task);
        });
        (done, rx)
    }

    /// Signals completion. Consumes the continuation.
    pub fn complete(self, task: Task, completed_sync: bool) {
        (self.callback)(task, completed_sync)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation").finish_non_exhaustive()
    }
}
