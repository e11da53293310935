//! # Round-robin selection.
//!
//! [`RoundRobinStrategy`] keeps one cursor per instance. The cursor starts before
//! index 0; every call advances it by one and wraps past the end of the snapshot.
//! Sticky selection uses it to assign new buckets.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::handlers::HandlerRef;
use crate::strategies::SelectionStrategy;
use crate::tasks::Task;

/// Cycles through the handlers in registration order.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    /// Index of the last pick; `None` before the first call.
    cursor: Mutex<Option<usize>>,
}

impl RoundRobinStrategy {
    /// Creates a new round-robin strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index chosen by the most recent call.
    pub fn last_index(&self) -> Option<usize> {
        *self.cursor.lock()
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(&self, handlers: &[HandlerRef], _task: &Task) -> Option<HandlerRef> {
        if handlers.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock();
        let next = match *cursor {
            Some(i) if i + 1 < handlers.len() => i + 1,
            _ => 0,
        };
        *cursor = Some(next);
        Some(Arc::clone(&handlers[next]))
    }
}
