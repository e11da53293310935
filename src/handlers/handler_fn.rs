//! # Function-backed synchronous handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(&mut Task) -> Result<(), E>`. The closure
//! runs on the calling thread and the continuation fires before `process` returns,
//! so the handler always completes synchronously.
//!
//! An `Err(e)` returned by the closure is stored in the task's error slot.
//!
//! ## Example
//! ```rust
//! use taskmux::{HandlerExt, HandlerFn, HandlerRef, Task};
//!
//! let h: HandlerRef = HandlerFn::arc("upper", |task: &mut Task| {
//!     let text = task.payload_ref::<String>().cloned().unwrap_or_default();
//!     task.set_payload(text.to_uppercase());
//!     Ok::<_, std::io::Error>(())
//! });
//!
//! let done = h.call_blocking(Task::new(String::from("hi"))).unwrap();
//! assert_eq!(done.payload_ref::<String>().map(String::as_str), Some("HI"));
//! ```

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::handlers::Handler;
use crate::tasks::{Continuation, Task};

/// Synchronous function-backed handler.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`](crate::HandlerRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, E> Handler for HandlerFn<F>
where
    F: Fn(&mut Task) -> Result<(), E> + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, mut task: Task, done: Continuation) -> bool {
        if let Err(e) = (self.f)(&mut task) {
            task.set_error(e);
        }
        done.complete(task, true);
        true
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").field("name", &self.name).finish()
    }
}
