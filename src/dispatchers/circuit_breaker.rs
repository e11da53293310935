//! # Circuit breaker dispatcher.
//!
//! [`CircuitBreakerDispatcher`] wraps one handler and tracks consecutive failures.
//!
//! ## States
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────► Open
//!     ▲                                │ now - last_failure >= half_open_after
//!     │ success                        ▼
//!     └───────────────────────────── HalfOpen ──► failure ──► Open (window restarts)
//! ```
//! `HalfOpen` is not stored; it is the `Open` state once the window has elapsed.
//!
//! ## Per call
//! 1. Cancelled gate (forced shutdown) ─► `Rejected`, synchronous; handler and
//!    counters untouched.
//! 2. Circuit open ─► the task is marked with [`DispatchError::CircuitOpen`].
//!    The wrapped handler is **still invoked** and may overwrite the error.
//! 3. On completion: a failure admitted by the allowlist increments the counter
//!    and restarts the window; anything else resets the counter to zero.
//!
//! Only the first registered handler is used.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{allowlisted, DispatchError};
use crate::handlers::{Handler, HandlerRef};
use crate::registry::{Registry, Snapshot};
use crate::tasks::{Continuation, Task};

/// Observable breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are marked as circuit-open.
    Open,
    /// Window elapsed; the next call probes the handler.
    HalfOpen,
}

#[derive(Debug, Default)]
struct Counters {
    failures: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
struct Breaker {
    config: CircuitBreakerConfig,
    counters: Mutex<Counters>,
}

impl Breaker {
    /// Returns the time since the last failure if the circuit is open at `now`.
    fn open_for(&self, c: &Counters, now: Instant) -> Option<Duration> {
        if c.failures < self.config.threshold_clamped() {
            return None;
        }
        let since = now.saturating_duration_since(c.last_failure?);
        (since < self.config.half_open_after).then_some(since)
    }

    fn state(&self, now: Instant) -> CircuitState {
        let c = self.counters.lock();
        if c.failures < self.config.threshold_clamped() {
            CircuitState::Closed
        } else if self.open_for(&c, now).is_some() {
            CircuitState::Open
        } else {
            CircuitState::HalfOpen
        }
    }

    fn record(&self, task: &Task) {
        let counts = task
            .error()
            .is_some_and(|err| allowlisted(&self.config.errors, err.as_ref()));

        let mut c = self.counters.lock();
        if counts {
            c.failures = c.failures.saturating_add(1);
            c.last_failure = Some(Instant::now());
            if c.failures == self.config.threshold_clamped() {
                warn!(failures = c.failures, "circuit opened");
            } else {
                debug!(failures = c.failures, "failure recorded");
            }
        } else if c.failures > 0 {
            debug!(failures = c.failures, "failure count reset");
            c.failures = 0;
        }
    }
}

/// Dispatcher guarding one handler with a failure-count circuit.
///
/// # Example
/// ```
/// use taskmux::{CircuitBreakerConfig, CircuitBreakerDispatcher, CircuitState, HandlerExt, HandlerFn, Task};
///
/// let cb = CircuitBreakerDispatcher::new(
///     HandlerFn::arc("db", |_t: &mut Task| Err::<(), _>(std::io::Error::other("down"))),
///     CircuitBreakerConfig { threshold: 1, ..Default::default() },
/// );
/// cb.call_blocking(Task::new(())).unwrap();
/// assert_eq!(cb.failure_count(), 1);
/// assert_eq!(cb.state(), CircuitState::Open);
/// ```
#[derive(Debug)]
pub struct CircuitBreakerDispatcher {
    registry: Registry,
    breaker: Arc<Breaker>,
    gate: CancellationToken,
}

impl CircuitBreakerDispatcher {
    /// Wraps `handler`.
    pub fn new(handler: HandlerRef, config: CircuitBreakerConfig) -> Self {
        Self::with_handlers(config, [handler])
    }

    /// Creates a breaker over a seeded registry; only the first handler is used.
    pub fn with_handlers(
        config: CircuitBreakerConfig,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Self {
        Self {
            registry: Registry::with_handlers(handlers),
            breaker: Arc::new(Breaker {
                config,
                counters: Mutex::new(Counters::default()),
            }),
            gate: CancellationToken::new(),
        }
    }

    /// Uses `gate` as the run-allowed signal; cancelling it rejects further tasks.
    pub fn with_gate(mut self, gate: CancellationToken) -> Self {
        self.gate = gate;
        self
    }

    /// Run-allowed signal. Cancel it to reject tasks during a forced shutdown.
    pub fn gate(&self) -> &CancellationToken {
        &self.gate
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

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.breaker.config
    }

    /// Consecutive failures recorded so far.
    pub fn failure_count(&self) -> u32 {
        self.breaker.counters.lock().failures
    }

    /// Current state, computed from the counters and the clock.
    pub fn state(&self) -> CircuitState {
        self.breaker.state(Instant::now())
    }
}

impl Handler for CircuitBreakerDispatcher {
    fn name(&self) -> &str {
        "circuit_breaker"
    }

    fn process(&self, mut task: Task, done: Continuation) -> bool {
        if self.gate.is_cancelled() {
            task.set_error(DispatchError::Rejected {
                reason: "forced shutdown in progress".to_string(),
            });
            done.complete(task, true);
            return true;
        }

        let Some(handler) = self.registry.list().first().cloned() else {
            task.set_error(DispatchError::NoHandlersAvailable);
            done.complete(task, true);
            return true;
        };

        {
            let c = self.breaker.counters.lock();
            if let Some(since) = self.breaker.open_for(&c, Instant::now()) {
                warn!(
                    failures = c.failures,
                    since_last_failure = ?since,
                    handler = handler.name(),
                    "circuit open"
                );
                task.set_error(DispatchError::CircuitOpen {
                    failures: c.failures,
                    since_last_failure: since,
                });
            }
        }

        let breaker = Arc::clone(&self.breaker);
        handler.process(
            task,
            Continuation::new(move |task, sync| {
                breaker.record(&task);
                done.complete(task, sync);
            }),
        )
    }

    fn start(&self) -> Result<(), DispatchError> {
        if self.breaker.config.threshold == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "circuit breaker threshold must be at least 1".into(),
            ));
        }
        let handlers = self.registry.len();
        if handlers > 1 {
            warn!(handlers, "circuit breaker only uses the first handler");
        }
        self.registry.start()?;
        info!(
            threshold = self.breaker.config.threshold,
            half_open_after = ?self.breaker.config.half_open_after,
            "circuit breaker started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), DispatchError> {
        self.registry.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handlers::{HandlerExt, HandlerFn, SpawnHandler};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("backend down")]
    struct Down;

    #[derive(Debug, thiserror::Error)]
    #[error("bad request")]
    struct BadRequest;

    #[derive(Debug, thiserror::Error)]
    enum Mixed {
        #[error("backend")]
        Backend(#[source] Down),
        #[error("client")]
        Client(#[source] BadRequest),
    }

    struct Downstream {
        fail: AtomicBool,
        calls: AtomicUsize,
        saw_open: AtomicUsize,
    }

    impl Downstream {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(fail),
                calls: AtomicUsize::new(0),
                saw_open: AtomicUsize::new(0),
            })
        }
    }

    impl Handler for Downstream {
        fn process(&self, mut task: Task, done: Continuation) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if matches!(
                task.error_as::<DispatchError>(),
                Some(DispatchError::CircuitOpen { .. })
            ) {
                self.saw_open.fetch_add(1, Ordering::SeqCst);
            }
            if self.fail.load(Ordering::SeqCst) {
                task.set_error(Down);
            }
            done.complete(task, true);
            true
        }
    }

    fn breaker(backend: &Arc<Downstream>, threshold: u32) -> CircuitBreakerDispatcher {
        CircuitBreakerDispatcher::new(
            Arc::clone(backend) as HandlerRef,
            CircuitBreakerConfig {
                threshold,
                half_open_after: Duration::from_secs(10),
                errors: Vec::new(),
            },
        )
    }

    #[test]
    fn start_rejects_zero_threshold() {
        let backend = Downstream::new(false);
        let cb = breaker(&backend, 0);
        assert!(matches!(
            cb.start(),
            Err(DispatchError::InvalidConfiguration(_))
        ));
        assert!(breaker(&backend, 1).start().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_but_still_invokes_handler() {
        let backend = Downstream::new(true);
        let cb = breaker(&backend, 2);

        cb.call_blocking(Task::new(())).unwrap();
        cb.call_blocking(Task::new(())).unwrap();
        assert_eq!(cb.failure_count(), 2);
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(3)).await;
        backend.fail.store(false, Ordering::SeqCst);
        let task = cb.call_blocking(Task::new(())).unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(backend.saw_open.load(Ordering::SeqCst), 1);
        match task.error_as::<DispatchError>() {
            Some(DispatchError::CircuitOpen {
                failures,
                since_last_failure,
            }) => {
                assert_eq!(*failures, 2);
                assert_eq!(*since_last_failure, Duration::from_secs(3));
            }
            other => panic!("expected circuit open, got {other:?}"),
        }
        // The circuit-open mark is itself a failure and restarts the window.
        assert_eq!(cb.failure_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_counter() {
        let backend = Downstream::new(true);
        let cb = breaker(&backend, 3);

        cb.call_blocking(Task::new(())).unwrap();
        cb.call_blocking(Task::new(())).unwrap();
        assert_eq!(cb.failure_count(), 2);

        backend.fail.store(false, Ordering::SeqCst);
        let task = cb.call_blocking(Task::new(())).unwrap();
        assert!(!task.is_failed());
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_after_window() {
        let backend = Downstream::new(true);
        let cb = breaker(&backend, 2);
        cb.call_blocking(Task::new(())).unwrap();
        cb.call_blocking(Task::new(())).unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        backend.fail.store(false, Ordering::SeqCst);
        let task = cb.call_blocking(Task::new(())).unwrap();
        assert!(!task.is_failed());
        assert_eq!(backend.saw_open.load(Ordering::SeqCst), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let backend = Downstream::new(true);
        let cb = breaker(&backend, 2);
        cb.call_blocking(Task::new(())).unwrap();
        cb.call_blocking(Task::new(())).unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        cb.call_blocking(Task::new(())).unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 3);
    }

    #[test]
    fn cancelled_gate_rejects_without_touching_handler() {
        let backend = Downstream::new(true);
        let gate = CancellationToken::new();
        let cb = breaker(&backend, 1).with_gate(gate.clone());
        gate.cancel();

        let (done, mut rx) = Continuation::channel();
        assert!(cb.process(Task::new(()), done));
        let task = rx.try_recv().unwrap();
        assert!(matches!(
            task.error_as::<DispatchError>(),
            Some(DispatchError::Rejected { .. })
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn failures_outside_allowlist_reset_counter() {
        let flip = Arc::new(AtomicBool::new(true));
        let f = Arc::clone(&flip);
        let h: HandlerRef = HandlerFn::arc("mixed", move |_t: &mut Task| {
            if f.load(Ordering::SeqCst) {
                Err::<(), _>(Mixed::Backend(Down))
            } else {
                Err(Mixed::Client(BadRequest))
            }
        });
        let cb = CircuitBreakerDispatcher::new(
            h,
            CircuitBreakerConfig {
                threshold: 5,
                errors: vec![ErrorKind::of::<Down>()],
                ..Default::default()
            },
        );

        cb.call_blocking(Task::new(())).unwrap();
        assert_eq!(cb.failure_count(), 1);

        flip.store(false, Ordering::SeqCst);
        let task = cb.call_blocking(Task::new(())).unwrap();
        assert!(task.is_failed());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn no_handler_fails_fast() {
        let cb = CircuitBreakerDispatcher::with_handlers(CircuitBreakerConfig::default(), []);
        let task = cb.call_blocking(Task::new(())).unwrap();
        assert_eq!(
            task.error_as::<DispatchError>(),
            Some(&DispatchError::NoHandlersAvailable)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_completion_updates_counters() {
        let h: HandlerRef = SpawnHandler::arc("remote", |mut task: Task| async move {
            task.set_error(Down);
            task
        });
        let cb = CircuitBreakerDispatcher::new(h, CircuitBreakerConfig::default());

        let (done, rx) = Continuation::channel();
        assert!(!cb.process(Task::new(()), done));
        let task = rx.await.unwrap();
        assert!(task.is_failed());
        assert_eq!(cb.failure_count(), 1);
    }
}
