//! # Asynchronous handler running on the tokio runtime (`SpawnHandler`)
//!
//! [`SpawnHandler`] wraps an async closure `F: Fn(Task) -> Fut` where
//! `Fut: Future<Output = Task>`. Each `process` call spawns a fresh future on the
//! runtime and returns `false` immediately; the continuation fires from the
//! runtime worker with `completed_sync = false`.
//!
//! ## Panic handling
//! The spawned future is wrapped in `catch_unwind`. When it panics, the caller
//! receives a copy of the task taken before the call, carrying
//! [`DispatchError::HandlerPanicked`]. The continuation still fires exactly once.
//!
//! ## Missing runtime
//! Without a runtime (none captured via [`SpawnHandler::with_runtime`] and none
//! current), the task completes synchronously with [`DispatchError::Rejected`].

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::warn;

use crate::error::DispatchError;
use crate::handlers::Handler;
use crate::tasks::{Continuation, Task};

/// Function-backed handler completing asynchronously on a tokio runtime.
pub struct SpawnHandler<F> {
    name: Cow<'static, str>,
    f: F,
    runtime: Option<Handle>,
}

impl<F> SpawnHandler<F> {
    /// Creates a handler that spawns onto the runtime current at `process` time.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            runtime: None,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }

    /// Pins the handler to a specific runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }
}

impl<F, Fut> Handler for SpawnHandler<F>
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Task> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let Some(runtime) = self.runtime() else {
            warn!(handler = %self.name, "no tokio runtime available");
            task.set_error(DispatchError::Rejected {
                reason: "no tokio runtime available".to_string(),
            });
            done.complete(task, true);
            return true;
        };

        let fallback = task.copy();
        let name = self.name.to_string();
        let fut = (self.f)(task);

        runtime.spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(task) => done.complete(task, false),
                Err(panic_err) => {
                    let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    warn!(handler = %name, %info, "handler panicked");

                    let mut task = fallback;
                    task.set_error(DispatchError::HandlerPanicked {
                        handler: name,
                        info,
                    });
                    done.complete(task, false);
                }
            }
        });
        false
    }
}

impl<F> fmt::Debug for SpawnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
