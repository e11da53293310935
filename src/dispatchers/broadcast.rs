//! # Broadcast dispatcher.
//!
//! [`BroadcastDispatcher`] forwards the task to every registered handler, one
//! after another, in registration order.
//!
//! ## Rules
//! - Each handler receives its own [`Task::copy`] unless copying is disabled, in
//!   which case the same task travels down the whole chain.
//! - The next handler starts only after the previous one completed.
//! - The first failure stops the broadcast; the remaining handlers are skipped and
//!   the failure is surfaced on the caller's task.
//! - An empty registry completes the task unchanged.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dispatchers::trampoline::{forward, Forwarded};
use crate::error::DispatchError;
use crate::handlers::{Handler, HandlerRef};
use crate::registry::{Registry, Snapshot};
use crate::tasks::{Continuation, Task};

/// Dispatcher that forwards each task to all handlers, stopping at the first failure.
#[derive(Debug)]
pub struct BroadcastDispatcher {
    registry: Registry,
    copy: bool,
}

impl BroadcastDispatcher {
    /// Creates an empty dispatcher that sends a copy to each handler.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            copy: true,
        }
    }

    /// Creates a dispatcher seeded with handlers.
    pub fn with_handlers(handlers: impl IntoIterator<Item = HandlerRef>) -> Self {
        Self {
            registry: Registry::with_handlers(handlers),
            copy: true,
        }
    }

    /// Sends the caller's task itself down the chain instead of copies.
    pub fn shared(mut self) -> Self {
        self.copy = false;
        self
    }

    pub fn is_copying(&self) -> bool {
        self.copy
    }

    pub fn add(&self, handler: HandlerRef) {
        self.registry.add(handler);
    }

    pub fn remove(&self, handler: &HandlerRef) -> bool {
        self.registry.remove(handler)
    }

    pub fn list(&self) -> Snapshot {
        self.registry.list()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for BroadcastDispatcher {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn process(&self, task: Task, done: Continuation) -> bool {
        let handlers = self.registry.list();
        if handlers.is_empty() {
            done.complete(task, true);
            return true;
        }

        let run = Arc::new(Run {
            handlers,
            state: Mutex::new(RunState {
                next: 0,
                original: None,
                done: Some(done),
            }),
            copy: self.copy,
        });
        let first = run.begin(task);
        drive(run, first, true)
    }

    fn start(&self) -> Result<(), DispatchError> {
        self.registry.start()
    }

    fn stop(&self) -> Result<(), DispatchError> {
        self.registry.stop()
    }
}

/// One in-flight broadcast.
struct Run {
    handlers: Snapshot,
    copy: bool,
    state: Mutex<RunState>,
}

struct RunState {
    next: usize,
    /// Caller's task while copies are out.
    original: Option<Task>,
    done: Option<Continuation>,
}

enum Step {
    Forward(HandlerRef, Task),
    Finish(Task),
}

impl Run {
    fn begin(&self, task: Task) -> Step {
        if !self.copy {
            return self.next_or_finish(task);
        }
        let outgoing = task.copy();
        self.state.lock().original = Some(task);
        self.next_or_finish(outgoing)
    }

    /// Evaluates the task a handler just returned.
    fn after(&self, returned: Task) -> Step {
        if !self.copy {
            if returned.is_failed() {
                return Step::Finish(returned);
            }
            return self.next_or_finish(returned);
        }

        let mut st = self.state.lock();
        let Some(mut original) = st.original.take() else {
            return Step::Finish(returned);
        };
        if let Some(err) = returned.error() {
            original.set_error_ref(Arc::clone(err));
            return Step::Finish(original);
        }
        let outgoing = original.copy();
        st.original = Some(original);
        drop(st);
        self.next_or_finish(outgoing)
    }

    /// Hands `task` to the next handler, or finishes when none is left.
    fn next_or_finish(&self, task: Task) -> Step {
        let mut st = self.state.lock();
        let index = st.next;
        let Some(handler) = self.handlers.get(index) else {
            let result = if self.copy {
                st.original.take().unwrap_or(task)
            } else {
                task
            };
            return Step::Finish(result);
        };
        st.next += 1;
        Step::Forward(Arc::clone(handler), task)
    }

    fn finish(&self, task: Task, sync: bool) {
        let done = self.state.lock().done.take();
        match done {
            Some(done) => done.complete(task, sync),
            None => warn!(task = task.id(), "broadcast completed twice"),
        }
    }
}

/// Runs the broadcast until it finishes or a handler goes asynchronous.
fn drive(run: Arc<Run>, mut step: Step, sync: bool) -> bool {
    loop {
        match step {
            Step::Finish(task) => {
                if let Some(err) = task.error() {
                    debug!(error = %err, "broadcast stopped at failure");
                }
                run.finish(task, sync);
                return sync;
            }
            Step::Forward(handler, task) => {
                debug!(handler = handler.name(), task = task.id(), "broadcasting");
                let resume_run = Arc::clone(&run);
                let resume = move |task: Task| {
                    let next = resume_run.after(task);
                    drive(resume_run, next, false);
                };
                match forward(&handler, task, resume) {
                    Forwarded::Sync(task) => step = run.after(task),
                    Forwarded::Async => return false,
                }
            }
        }
    }
}
