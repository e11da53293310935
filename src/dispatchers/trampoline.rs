//! # Forwarding with synchronous handoff.
//!
//! Multi-step dispatchers (failover, broadcast) forward one task at a time and
//! must not grow the stack when every step completes synchronously.
//!
//! ```text
//! forward(handler, task, resume)
//!   handler.process(task, done)
//!     ├─ done fires with sync=true before process returns ─► slot = Returned(task)
//!     └─ done fires otherwise                             ─► resume(task)
//!   process returns
//!     ├─ slot = Returned(task) ─► Forwarded::Sync(task)   (caller loops)
//!     └─ slot = Pending        ─► Forwarded::Async         (resume runs later)
//! ```
//!
//! A `sync=true` completion arriving after `process` returned is routed to
//! `resume` as well, so the task is never stranded in the slot.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handlers::HandlerRef;
use crate::tasks::{Continuation, Task};

/// Result of one forward.
pub(crate) enum Forwarded {
    /// The task came back on the current stack.
    Sync(Task),
    /// The task will come back through `resume`.
    Async,
}

enum Handoff {
    Pending,
    Returned(Task),
    Detached,
}

/// Forwards `task` to `handler`. Asynchronous completions are passed to `resume`.
pub(crate) fn forward<R>(handler: &HandlerRef, task: Task, resume: R) -> Forwarded
where
    R: FnOnce(Task) + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Handoff::Pending));
    let handoff = Arc::clone(&slot);

    let done = Continuation::new(move |task, sync| {
        let mut state = handoff.lock();
        if sync && matches!(*state, Handoff::Pending) {
            *state = Handoff::Returned(task);
            return;
        }
        *state = Handoff::Detached;
        drop(state);
        resume(task);
    });

    handler.process(task, done);

    let mut state = slot.lock();
    match mem::replace(&mut *state, Handoff::Detached) {
        Handoff::Returned(task) => Forwarded::Sync(task),
        Handoff::Pending | Handoff::Detached => Forwarded::Async,
    }
}
