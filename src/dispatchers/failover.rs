//! # Failover dispatcher.
//!
//! [`FailoverDispatcher`] forwards the task to one handler and, when it fails with
//! a failover-eligible error, retries on the next handler until one succeeds, the
//! attempt budget runs out, or the handlers are exhausted.
//!
//! ## Architecture
//! ```text
//! process(task, done)
//!   ├─ snapshot empty ─► NoHandlersAvailable
//!   ├─ index = round_robin ? cursor.next() : sticky ? last_good : 0
//!   └─ Chain { snapshot, index, attempts, done }
//!          │
//!          ▼
//!   ┌──► forward(handlers[index], task) ──► Sync(task) ──┐
//!   │                 │                                  │
//!   │                 └── Async: resume from the         │
//!   │                     completing thread ─────────────┤
//!   │                                                    ▼
//!   │                                      outcome(task)
//!   │    reset_for_retry, index += 1  ◄── retry │ finish ──► done(task, sync)
//!   └────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Retries for one task are strictly sequential; the next attempt starts only
//!   after the previous completion fired.
//! - Synchronous retries loop on the current stack frame instead of nesting.
//! - `process` returns `true` only if every attempt completed synchronously.
//! - The caller's continuation fires exactly once.
//! - Failures outside the allowlist are surfaced without failover.
//! - Configuration errors from nested dispatchers are never failed over.
//! - `max_attempts` counts failovers, not the initial try.
//! - Sticky chains wrap to the front and stop once every handler failed.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::FailoverConfig;
use crate::dispatchers::trampoline::{forward, Forwarded};
use crate::error::{allowlisted, DispatchError};
use crate::handlers::{Handler, HandlerRef};
use crate::registry::{Registry, Snapshot};
use crate::tasks::{Continuation, Task};

/// State shared by every call of one dispatcher.
#[derive(Debug)]
struct Shared {
    config: FailoverConfig,
    /// Last round-robin starting index; `None` before the first call.
    cursor: Mutex<Option<usize>>,
    /// Index of the handler that last completed without an eligible failure.
    last_good: Mutex<Option<usize>>,
}

impl Shared {
    fn starting_index(&self, len: usize) -> usize {
        if self.config.round_robin {
            let mut cursor = self.cursor.lock();
            let next = match *cursor {
                Some(i) if i + 1 < len => i + 1,
                _ => 0,
            };
            *cursor = Some(next);
            return next;
        }
        if self.config.sticky {
            return match *self.last_good.lock() {
                Some(i) if i < len => i,
                _ => 0,
            };
        }
        0
    }

    fn is_eligible(&self, task: &Task) -> bool {
        if task
            .error_as::<DispatchError>()
            .is_some_and(DispatchError::is_configuration)
        {
            return false;
        }
        task.error()
            .is_some_and(|err| allowlisted(&self.config.errors, err.as_ref()))
    }
}

/// Dispatcher that retries a failed task on the next handler.
///
/// # Example
/// ```
/// use taskmux::{FailoverConfig, FailoverDispatcher, HandlerExt, HandlerFn, Task};
///
/// let dispatcher = FailoverDispatcher::new(FailoverConfig::default());
/// dispatcher.add(HandlerFn::arc("flaky", |_t: &mut Task| {
///     Err::<(), _>(std::io::Error::other("down"))
/// }));
/// dispatcher.add(HandlerFn::arc("backup", |_t: &mut Task| Ok::<_, std::io::Error>(())));
///
/// let done = dispatcher.call_blocking(Task::new(())).unwrap();
/// assert!(!done.is_failed());
/// ```
#[derive(Debug)]
pub struct FailoverDispatcher {
    registry: Registry,
    shared: Arc<Shared>,
}

impl FailoverDispatcher {
    pub fn new(config: FailoverConfig) -> Self {
        Self::with_handlers(config, [])
    }

    /// Creates a dispatcher seeded with handlers (tried in this order).
    pub fn with_handlers(
        config: FailoverConfig,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Self {
        Self {
            registry: Registry::with_handlers(handlers),
            shared: Arc::new(Shared {
                config,
                cursor: Mutex::new(None),
                last_good: Mutex::new(None),
            }),
        }
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

    pub fn config(&self) -> &FailoverConfig {
        &self.shared.config
    }

    /// Index of the handler that last completed without an eligible failure.
    pub fn last_good_index(&self) -> Option<usize> {
        *self.shared.last_good.lock()
    }
}

impl Handler for FailoverDispatcher {
    fn name(&self) -> &str {
        "failover"
    }

    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let handlers = self.registry.list();
        if handlers.is_empty() {
            task.set_error(DispatchError::NoHandlersAvailable);
            done.complete(task, true);
            return true;
        }

        let index = self.shared.starting_index(handlers.len());
        let chain = Arc::new(Chain {
            handlers,
            shared: Arc::clone(&self.shared),
            state: Mutex::new(ChainState { index, attempts: 0 }),
            done: Mutex::new(Some(done)),
        });
        debug!(index, task = task.id(), "failover starting");
        drive(chain, index, task, true)
    }

    fn start(&self) -> Result<(), DispatchError> {
        self.registry.start()
    }

    fn stop(&self) -> Result<(), DispatchError> {
        self.registry.stop()
    }
}

/// One task's failover chain.
struct Chain {
    handlers: Snapshot,
    shared: Arc<Shared>,
    state: Mutex<ChainState>,
    done: Mutex<Option<Continuation>>,
}

struct ChainState {
    index: usize,
    attempts: u32,
}

enum Outcome {
    Finish,
    Retry(usize),
}

impl Chain {
    /// Decides what happens after the current attempt completed.
    fn outcome(&self, task: &Task) -> Outcome {
        let mut st = self.state.lock();

        if !self.shared.is_eligible(task) {
            if !task.is_failed() {
                *self.shared.last_good.lock() = Some(st.index);
            }
            return Outcome::Finish;
        }

        st.attempts += 1;
        if let Some(limit) = self.shared.config.attempt_limit() {
            if st.attempts > limit {
                debug!(attempts = st.attempts, limit, "failover attempts exhausted");
                return Outcome::Finish;
            }
        }

        let config = &self.shared.config;
        let len = self.handlers.len();
        if config.sticky && !config.round_robin && st.attempts as usize >= len {
            debug!(attempts = st.attempts, "every handler failed once");
            return Outcome::Finish;
        }

        let mut next = st.index + 1;
        if next >= len {
            if !config.round_robin && !config.sticky {
                debug!(attempts = st.attempts, "no handler left to fail over to");
                return Outcome::Finish;
            }
            next = 0;
        }
        st.index = next;

        warn!(
            attempt = st.attempts,
            index = next,
            handler = self.handlers[next].name(),
            error = %task.error().map(|e| e.to_string()).unwrap_or_default(),
            "failing over"
        );
        Outcome::Retry(next)
    }

    fn finish(&self, task: Task, sync: bool) {
        let done = self.done.lock().take();
        match done {
            Some(done) => done.complete(task, sync),
            None => warn!(task = task.id(), "failover chain completed twice"),
        }
    }
}

/// Forwards to `handlers[index]` and keeps failing over while attempts complete
/// synchronously. Returns `sync` if the chain finished on this stack, `false`
/// once an attempt went asynchronous.
fn drive(chain: Arc<Chain>, mut index: usize, mut task: Task, sync: bool) -> bool {
    loop {
        let handler = Arc::clone(&chain.handlers[index]);
        let resume_chain = Arc::clone(&chain);
        let on_async = move |task: Task| resume(resume_chain, task);

        task = match forward(&handler, task, on_async) {
            Forwarded::Sync(task) => task,
            Forwarded::Async => return false,
        };

        match chain.outcome(&task) {
            Outcome::Finish => {
                chain.finish(task, sync);
                return sync;
            }
            Outcome::Retry(next) => {
                task.reset_for_retry();
                index = next;
            }
        }
    }
}

/// Continues a chain on the thread that completed an asynchronous attempt.
fn resume(chain: Arc<Chain>, mut task: Task) {
    match chain.outcome(&task) {
        Outcome::Finish => chain.finish(task, false),
        Outcome::Retry(next) => {
            task.reset_for_retry();
            drive(chain, next, task, false);
        }
    }
}
