//! # Example: weighted
//!
//! Compares the weighted strategies and sticky routing behind a [`QueueDispatcher`].
//!
//! Demonstrates how to:
//! - Parse distribution weights from a ratio string.
//! - Observe per-round distribution of weighted round-robin and weighted random.
//! - Keep per-customer affinity with [`StickyStrategy`] and purge it on removal.
//!
//! ## Run
//! ```bash
//! cargo run --example weighted
//! ```

use std::collections::BTreeMap;

use taskmux::{
    Handler, HandlerExt, HandlerFn, HandlerRef, QueueDispatcher, SelectionStrategy,
    StickyStrategy, Task, Value, WeightedConfig, WeightedRandomStrategy,
    WeightedRoundRobinStrategy,
};
use tracing_subscriber::EnvFilter;

fn backend(name: &'static str) -> HandlerRef {
    HandlerFn::arc(name, move |task: &mut Task| {
        task.set_property("served_by", Value::from(name));
        Ok::<_, std::convert::Infallible>(())
    })
}

fn served_by(task: &Task) -> String {
    task.property("served_by")
        .and_then(Value::as_str)
        .unwrap_or("nobody")
        .to_string()
}

fn run_rounds(
    label: &str,
    strategy: impl SelectionStrategy,
    rounds: usize,
) -> anyhow::Result<()> {
    let queue = QueueDispatcher::with_handlers(
        strategy,
        [backend("big"), backend("medium"), backend("small")],
    );
    queue.start()?;

    for round in 0..rounds {
        let mut order = Vec::new();
        let mut counts = BTreeMap::new();
        for _ in 0..7 {
            let name = served_by(&queue.call_blocking(Task::new(()))?);
            *counts.entry(name.clone()).or_insert(0) += 1;
            order.push(name);
        }
        println!("[{label}] round {round}: {order:?} -> {counts:?}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // 1. Same 4:2:1 split, two orderings.
    let cfg = WeightedConfig::from_ratio("4,2,1")?;
    run_rounds("round-robin", WeightedRoundRobinStrategy::new(&cfg), 2)?;
    run_rounds("random", WeightedRandomStrategy::new(&cfg), 2)?;

    // 2. Sticky routing by customer.
    let backends = [backend("east"), backend("west")];
    let queue = QueueDispatcher::with_handlers(
        StickyStrategy::new(|t: &Task| t.property("customer").cloned()),
        backends.clone(),
    );
    let request = |customer: &str| Task::new(()).with_property("customer", customer);

    for customer in ["acme", "globex", "acme", "initech", "globex"] {
        let task = queue.call_blocking(request(customer))?;
        println!("[sticky] {customer} -> {}", served_by(&task));
    }

    queue.remove(&backends[0]);
    println!("[sticky] removed {}", backends[0].name());
    for customer in ["acme", "globex", "initech"] {
        let task = queue.call_blocking(request(customer))?;
        println!("[sticky] {customer} -> {}", served_by(&task));
    }
    Ok(())
}
