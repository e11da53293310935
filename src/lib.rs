//! # taskmux
//!
//! **Taskmux** is a small dispatch core for Rust: it routes a unit of work
//! ([`Task`]) to one or more downstream [`Handler`]s.
//!
//! Handlers complete through a one-shot [`Continuation`], either synchronously
//! (before `process` returns) or asynchronously (later, from another thread or a
//! tokio worker). Every dispatcher is itself a [`Handler`], so they compose.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                         caller
//!                           │ process(task, done)
//!                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher (implements Handler)                                  │
//! │  - Registry (copy-on-write handler list, lock-free snapshots)     │
//! │  - Queue:          SelectionStrategy ─► one handler               │
//! │  - Broadcast:      every handler, in order, stop at first failure │
//! │  - Failover:       next handler on eligible failure (trampoline)  │
//! │  - CircuitBreaker: failure counter + open window                  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  HandlerFn   │   │ SpawnHandler │   │  Dispatcher  │
//!     │ (sync)       │   │ (tokio task) │   │ (nested)     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │                  │                  │
//!            └──────────────────┴──────────────────┘
//!                               │ done.complete(task, completed_sync)
//!                               ▼
//!                             caller (exactly once)
//! ```
//!
//! ### Failover lifecycle
//! ```text
//! process(task, done)
//!   ├─► snapshot empty ─► NoHandlersAvailable
//!   ├─► index = start (0 | round-robin cursor | last good)
//!   └─► loop {
//!         forward(handlers[index], task)
//!           ├─ async ─► return false; resume on the completing thread
//!           └─ sync  ─► outcome(task)
//!                 ├─ success / non-eligible failure ─► done(task), exit
//!                 ├─ attempts > max_attempts        ─► done(task), exit
//!                 ├─ past last handler, no wrap     ─► done(task), exit
//!                 └─ otherwise ─► reset_for_retry, index += 1, continue
//!       }
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                                       |
//! |-------------------|-----------------------------------------------------------------|----------------------------------------------------------|
//! | **Tasks**         | Payload, error slot, property bag, completion callback.         | [`Task`], [`Value`], [`Continuation`]                    |
//! | **Handlers**      | Processing contract and closure adapters.                       | [`Handler`], [`HandlerExt`], [`HandlerFn`], [`SpawnHandler`] |
//! | **Registry**      | Concurrent copy-on-write handler list with lifecycle cascade.   | [`Registry`]                                             |
//! | **Strategies**    | Random, round-robin, sticky, weighted selection.                | [`SelectionStrategy`], [`StickyStrategy`], ...           |
//! | **Dispatchers**   | Queue, broadcast, failover, circuit breaker.                    | [`QueueDispatcher`], [`FailoverDispatcher`], ...         |
//! | **Errors**        | Typed dispatch errors and error-kind allowlists.                | [`DispatchError`], [`ErrorKind`]                         |
//! | **Configuration** | Construction-time settings.                                     | [`FailoverConfig`], [`CircuitBreakerConfig`], ...        |
//!
//! ## Logging
//! The crate emits [`tracing`] events and never installs a subscriber.
//!
//! ## Example
//! ```rust
//! use taskmux::{
//!     FailoverConfig, FailoverDispatcher, Handler, HandlerExt, HandlerFn, HandlerRef, QueueDispatcher,
//!     RandomStrategy, Task, Value,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let primary: HandlerRef = HandlerFn::arc("primary", |_t: &mut Task| {
//!         Err::<(), _>(std::io::Error::other("primary is down"))
//!     });
//!     let replicas = QueueDispatcher::new(RandomStrategy::new());
//!     for name in ["replica-a", "replica-b"] {
//!         replicas.add(HandlerFn::arc(name, move |t: &mut Task| {
//!             t.set_property("served_by", Value::from(name));
//!             Ok::<_, std::io::Error>(())
//!         }));
//!     }
//!
//!     let failover = FailoverDispatcher::new(FailoverConfig::default());
//!     failover.add(primary);
//!     failover.add(std::sync::Arc::new(replicas));
//!     failover.start()?;
//!
//!     let task = failover.call(Task::new("payload")).await?;
//!     assert!(!task.is_failed());
//!     assert!(task.property("served_by").is_some());
//!     Ok(())
//! }
//! ```

mod config;
mod dispatchers;
mod error;
mod handlers;
mod registry;
mod strategies;
mod tasks;

// ---- Public re-exports ----

pub use config::{
    CircuitBreakerConfig, FailoverConfig, StickyConfig, WeightedConfig, DEFAULT_HASH_GROUPS,
    DEFAULT_RATIO_DELIMITER,
};
pub use dispatchers::{
    BroadcastDispatcher, CircuitBreakerDispatcher, CircuitState, FailoverDispatcher,
    QueueDispatcher,
};
pub use error::{DispatchError, ErrorKind};
pub use handlers::{same_handler, Call, Handler, HandlerExt, HandlerFn, HandlerRef, SpawnHandler};
pub use registry::{Registry, Snapshot};
pub use strategies::{
    DistributionEntry, DistributionTable, RandomStrategy, RoundRobinStrategy, SelectionStrategy,
    StickyStrategy, WeightedRandomStrategy, WeightedRoundRobinStrategy,
};
pub use tasks::{
    Continuation, Payload, Task, TaskErrorRef, Value, EXCEPTION_CAUGHT, FAILURE_HANDLED,
    FAILURE_HANDLER, HANDLED, REDELIVERED, REDELIVERY_COUNTER, REDELIVERY_MAX_COUNTER,
    RETRY_PROPERTIES,
};
