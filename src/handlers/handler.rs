//! # Handler contract.
//!
//! A [`Handler`] receives a [`Task`] together with a [`Continuation`] and must
//! complete that continuation exactly once, eventually.
//!
//! ## Synchronous vs asynchronous completion
//! ```text
//! sync:   process(task, done) ─► work ─► done.complete(task, true)  ─► return true
//! async:  process(task, done) ─► hand off ─► return false
//!                                    └─► (later, other thread) done.complete(task, false)
//! ```
//!
//! Dispatchers implement [`Handler`] too, so they nest arbitrarily.
//!
//! ## Rules
//! - Ownership of the task moves in with `process` and out with `complete`.
//! - `completed_sync == true` must only be reported from inside `process`.
//! - `start()`/`stop()` are lifecycle hooks; the default implementations do nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::DispatchError;
use crate::tasks::{Continuation, Task};

/// Shared handle to a handler. Identity is pointer identity.
pub type HandlerRef = Arc<dyn Handler>;

/// Capability that processes a [`Task`], synchronously or asynchronously.
///
/// # Example
/// ```
/// use taskmux::{Continuation, Handler, Task};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     fn name(&self) -> &str { "echo" }
///
///     fn process(&self, task: Task, done: Continuation) -> bool {
///         done.complete(task, true);
///         true
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Processes the task and completes `done` exactly once.
    ///
    /// Returns `true` if the task was completed synchronously.
    fn process(&self, task: Task, done: Continuation) -> bool;

    /// Lifecycle hook invoked when the owning dispatcher starts.
    fn start(&self) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Lifecycle hook invoked when the owning dispatcher stops.
    fn stop(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Returns `true` when both handles point at the same handler.
#[inline]
pub fn same_handler(a: &HandlerRef, b: &HandlerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Convenience calls on top of [`Handler::process`].
pub trait HandlerExt: Handler {
    /// Forwards the task and returns a future resolving to the completed task.
    fn call(&self, task: Task) -> Call {
        let (done, rx) = Continuation::channel();
        self.process(task, done);
        Call { rx }
    }

    /// Forwards the task and blocks the current thread until it completes.
    ///
    /// ### Notes
    /// Do not use from inside a current-thread tokio runtime when the handler
    /// completes on that same runtime; the runtime cannot make progress while blocked.
    fn call_blocking(&self, task: Task) -> Result<Task, DispatchError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let done = Continuation::new(move |task, _sync| {
            let _ = tx.send(task);
        });
        self.process(task, done);
        rx.recv().map_err(|_| DispatchError::Abandoned)
    }
}

impl<H: Handler + ?Sized> HandlerExt for H {}

/// Future returned by [`HandlerExt::call`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Call {
    rx: oneshot::Receiver<Task>,
}

impl Future for Call {
    type Output = Result<Task, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| DispatchError::Abandoned))
    }
}
