//! # Selection strategy contract.
//!
//! A [`SelectionStrategy`] picks one handler out of a registry snapshot for a
//! given task. It is plugged into a [`QueueDispatcher`](crate::QueueDispatcher).
//!
//! ## Contract
//! - `select` receives a non-empty snapshot; returning `None` makes the dispatcher
//!   fail the task with `NoHandlerChosen`.
//! - `validate` runs when the dispatcher starts; an error refuses the start.
//! - `on_remove` runs before a handler is removed from the registry, so that
//!   cached affinity to it can be purged.
//! - Implementations keep their mutable state behind a single lock (or atomics)
//!   per instance; instances are never shared between dispatchers.

use crate::error::DispatchError;
use crate::handlers::HandlerRef;
use crate::tasks::Task;

/// Algorithm choosing one handler for a task.
pub trait SelectionStrategy: Send + Sync + 'static {
    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Chooses one handler from `handlers` (never empty).
    fn select(&self, handlers: &[HandlerRef], task: &Task) -> Option<HandlerRef>;

    /// Checks the strategy against the handlers present at start.
    fn validate(&self, _handlers: &[HandlerRef]) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Forgets any state tied to `handler`, which is about to be removed.
    fn on_remove(&self, _handler: &HandlerRef) {}
}
