//! # Handler registry: copy-on-write ordered set of handlers.
//!
//! Every dispatcher owns one [`Registry`]. Handlers are added and removed while
//! tasks are in flight; readers take a snapshot and never block writers.
//!
//! ## Architecture
//! ```text
//! add(h) / remove(h)                      list() / snapshot
//!     │                                        │
//!     ▼                                        ▼
//! rcu(|old| build new Vec) ──► ArcSwap<Vec<HandlerRef>> ──► Arc<Vec<HandlerRef>>
//!                              (atomic pointer swap)        (immutable, lock-free read)
//! ```
//!
//! ## Rules
//! - `list()` returns either the pre- or post-mutation snapshot, never a partial one.
//! - `remove()` drops every entry pointer-equal to the handler; absent handler is a no-op.
//! - `start()` cascades in registration order and stops at the first failure.
//! - `stop()` cascades in reverse order, attempts every handler, reports the first failure.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::handlers::{same_handler, HandlerRef};

/// Immutable view of the registry at one instant.
pub type Snapshot = Arc<Vec<HandlerRef>>;

/// Ordered, concurrently readable collection of handlers.
pub struct Registry {
    handlers: ArcSwap<Vec<HandlerRef>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Creates a registry seeded with handlers (registration order preserved).
    pub fn with_handlers(handlers: impl IntoIterator<Item = HandlerRef>) -> Self {
        Self {
            handlers: ArcSwap::from_pointee(handlers.into_iter().collect()),
        }
    }

    /// Appends a handler.
    pub fn add(&self, handler: HandlerRef) {
        debug!(handler = handler.name(), "registering handler");
        self.handlers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&handler));
            next
        });
    }

    /// Removes every occurrence of `handler`. Returns `true` if anything was removed.
    pub fn remove(&self, handler: &HandlerRef) -> bool {
        let previous = self.handlers.rcu(|current| {
            current
                .iter()
                .filter(|h| !same_handler(h, handler))
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().any(|h| same_handler(h, handler));
        if removed {
            debug!(handler = handler.name(), "removed handler");
        }
        removed
    }

    /// Returns a snapshot of the current handlers.
    pub fn list(&self) -> Snapshot {
        self.handlers.load_full()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }

    /// Returns `true` if `handler` is registered.
    pub fn contains(&self, handler: &HandlerRef) -> bool {
        self.handlers.load().iter().any(|h| same_handler(h, handler))
    }

    /// Starts every handler in registration order.
    pub fn start(&self) -> Result<(), DispatchError> {
        let snapshot = self.list();
        for handler in snapshot.iter() {
            handler.start()?;
        }
        info!(handlers = snapshot.len(), "registry started");
        Ok(())
    }

    /// Stops every handler in reverse registration order.
    pub fn stop(&self) -> Result<(), DispatchError> {
        let snapshot = self.list();
        let mut first_err = None;
        for handler in snapshot.iter().rev() {
            if let Err(e) = handler.stop() {
                warn!(handler = handler.name(), error = %e, "handler failed to stop");
                first_err.get_or_insert(e);
            }
        }
        info!(handlers = snapshot.len(), "registry stopped");
        first_err.map_or(Ok(()), Err)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .handlers
            .load()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        f.debug_struct("Registry").field("handlers", &names).finish()
    }
}
