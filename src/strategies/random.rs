//! # Uniform random selection.
//!
//! [`RandomStrategy`] picks `index = random_range(0..n)`. With a single handler it
//! returns that handler without touching the generator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use crate::handlers::HandlerRef;
use crate::strategies::SelectionStrategy;
use crate::tasks::Task;

/// Picks a handler uniformly at random.
#[derive(Debug, Default)]
pub struct RandomStrategy {
    last_index: AtomicUsize,
}

impl RandomStrategy {
    /// Creates a new random strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index chosen by the most recent call.
    pub fn last_index(&self) -> usize {
        self.last_index.load(Ordering::Relaxed)
    }
}

impl SelectionStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, handlers: &[HandlerRef], _task: &Task) -> Option<HandlerRef> {
        let index = match handlers.len() {
            0 => return None,
            1 => 0,
            n => rand::rng().random_range(0..n),
        };
        self.last_index.store(index, Ordering::Relaxed);
        trace!(index, "random pick");
        handlers.get(index).map(Arc::clone)
    }
}
