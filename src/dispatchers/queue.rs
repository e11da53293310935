//! # Single-destination dispatcher.
//!
//! [`QueueDispatcher`] asks its [`SelectionStrategy`] for one handler and forwards
//! the task there together with the caller's continuation. Sync/async completion
//! passes straight through.
//!
//! ## Flow
//! ```text
//! process(task, done)
//!   snapshot empty       ─► NoHandlersAvailable, done(task, sync)
//!   strategy → None      ─► NoHandlerChosen,     done(task, sync)
//!   strategy → handler   ─► handler.process(task, done)
//! ```

use tracing::{debug, info};

use crate::error::DispatchError;
use crate::handlers::{Handler, HandlerRef};
use crate::registry::{Registry, Snapshot};
use crate::strategies::SelectionStrategy;
use crate::tasks::{Continuation, Task};

/// Dispatcher that forwards each task to exactly one strategy-selected handler.
///
/// # Example
/// ```
/// use taskmux::{Handler, HandlerExt, HandlerFn, QueueDispatcher, RoundRobinStrategy, Task};
///
/// let dispatcher = QueueDispatcher::new(RoundRobinStrategy::new());
/// dispatcher.add(HandlerFn::arc("a", |t: &mut Task| {
///     t.set_payload("a");
///     Ok::<_, std::io::Error>(())
/// }));
/// dispatcher.start().unwrap();
///
/// let done = dispatcher.call_blocking(Task::new(())).unwrap();
/// assert_eq!(done.payload_ref::<&str>(), Some(&"a"));
/// ```
pub struct QueueDispatcher {
    registry: Registry,
    strategy: Box<dyn SelectionStrategy>,
}

impl QueueDispatcher {
    /// Creates an empty dispatcher using `strategy`.
    pub fn new(strategy: impl SelectionStrategy) -> Self {
        Self {
            registry: Registry::new(),
            strategy: Box::new(strategy),
        }
    }

    /// Creates a dispatcher seeded with handlers.
    pub fn with_handlers(
        strategy: impl SelectionStrategy,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Self {
        Self {
            registry: Registry::with_handlers(handlers),
            strategy: Box::new(strategy),
        }
    }

    /// Registers a handler.
    pub fn add(&self, handler: HandlerRef) {
        self.registry.add(handler);
    }

    /// Unregisters a handler after purging any strategy state tied to it.
    pub fn remove(&self, handler: &HandlerRef) -> bool {
        self.strategy.on_remove(handler);
        self.registry.remove(handler)
    }

    /// Current handlers.
    pub fn list(&self) -> Snapshot {
        self.registry.list()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn strategy(&self) -> &dyn SelectionStrategy {
        self.strategy.as_ref()
    }
}

impl Handler for QueueDispatcher {
    fn name(&self) -> &str {
        "queue"
    }

    fn process(&self, mut task: Task, done: Continuation) -> bool {
        let handlers = self.registry.list();
        if handlers.is_empty() {
            task.set_error(DispatchError::NoHandlersAvailable);
            done.complete(task, true);
            return true;
        }

        let Some(handler) = self.strategy.select(&handlers, &task) else {
            debug!(strategy = self.strategy.name(), "strategy chose no handler");
            task.set_error(DispatchError::NoHandlerChosen);
            done.complete(task, true);
            return true;
        };

        debug!(
            strategy = self.strategy.name(),
            handler = handler.name(),
            task = task.id(),
            "dispatching"
        );
        handler.process(task, done)
    }

    fn start(&self) -> Result<(), DispatchError> {
        let handlers = self.registry.list();
        self.strategy.validate(&handlers)?;
        self.registry.start()?;
        info!(strategy = self.strategy.name(), handlers = handlers.len(), "queue dispatcher started");
        Ok(())
    }

    fn stop(&self) -> Result<(), DispatchError> {
        self.registry.stop()
    }
}

impl std::fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("strategy", &self.strategy.name())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::WeightedConfig;
    use crate::handlers::{same_handler, HandlerExt, HandlerFn};
    use crate::strategies::{RandomStrategy, StickyStrategy, WeightedRoundRobinStrategy};
    use crate::tasks::Value;

    fn tagging(name: &'static str) -> HandlerRef {
        HandlerFn::arc(name, move |t: &mut Task| {
            t.set_property("served_by", Value::from(name));
            Ok::<_, std::io::Error>(())
        })
    }

    fn served_by(task: &Task) -> &str {
        task.property("served_by").and_then(Value::as_str).unwrap_or("")
    }

    struct Nobody;

    impl SelectionStrategy for Nobody {
        fn select(&self, _: &[HandlerRef], _: &Task) -> Option<HandlerRef> {
            None
        }
    }

    #[test]
    fn empty_registry_fails_synchronously() {
        let d = QueueDispatcher::new(RandomStrategy::new());
        let (done, mut rx) = Continuation::channel();
        assert!(d.process(Task::new(()), done));

        let task = rx.try_recv().unwrap();
        assert_eq!(
            task.error_as::<DispatchError>(),
            Some(&DispatchError::NoHandlersAvailable)
        );
    }

    #[test]
    fn strategy_without_pick_fails() {
        let d = QueueDispatcher::with_handlers(Nobody, [tagging("a")]);
        let task = d.call_blocking(Task::new(())).unwrap();
        assert_eq!(
            task.error_as::<DispatchError>(),
            Some(&DispatchError::NoHandlerChosen)
        );
    }

    #[test]
    fn weighted_dispatch_follows_distribution() {
        let d = QueueDispatcher::with_handlers(
            WeightedRoundRobinStrategy::new(&WeightedConfig::new([3, 1])),
            [tagging("A"), tagging("B")],
        );
        d.start().unwrap();

        let order: Vec<String> = (0..8)
            .map(|_| served_by(&d.call_blocking(Task::new(())).unwrap()).to_string())
            .collect();
        assert_eq!(order, ["A", "B", "A", "A", "A", "B", "A", "A"]);
    }

    #[test]
    fn start_refuses_weight_mismatch() {
        let d = QueueDispatcher::with_handlers(
            WeightedRoundRobinStrategy::new(&WeightedConfig::new([1, 1, 1])),
            [tagging("A"), tagging("B")],
        );
        assert_eq!(
            d.start(),
            Err(DispatchError::ConfigurationMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn remove_purges_sticky_assignment() {
        let a = tagging("A");
        let b = tagging("B");
        let d = QueueDispatcher::with_handlers(
            StickyStrategy::new(|t: &Task| t.property("key").cloned()),
            [Arc::clone(&a), Arc::clone(&b)],
        );
        let keyed = || Task::new(()).with_property("key", "k1");

        let first = served_by(&d.call_blocking(keyed()).unwrap()).to_string();
        assert_eq!(first, "A");
        assert_eq!(served_by(&d.call_blocking(keyed()).unwrap()), "A");

        assert!(d.remove(&a));
        assert_eq!(served_by(&d.call_blocking(keyed()).unwrap()), "B");
        assert_eq!(d.list().len(), 1);
    }

    #[test]
    fn select_racing_remove_does_not_pin_removed_handler() {
        let a = tagging("A");
        let b = tagging("B");
        let d = QueueDispatcher::with_handlers(
            StickyStrategy::new(|t: &Task| t.property("key").cloned()),
            [Arc::clone(&a), Arc::clone(&b)],
        );
        let keyed = || Task::new(()).with_property("key", "k1");

        // A concurrent call loaded its snapshot before the remove and selects after the purge.
        let stale = d.list();
        assert!(d.remove(&a));
        let raced = d.strategy().select(&stale, &keyed()).unwrap();
        assert!(same_handler(&raced, &a));

        for _ in 0..3 {
            assert_eq!(served_by(&d.call_blocking(keyed()).unwrap()), "B");
        }
    }
}
