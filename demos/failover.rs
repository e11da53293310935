//! # Example: failover
//!
//! A circuit breaker guarding a failover group: a flaky primary backed by two
//! asynchronous replicas.
//!
//! Demonstrates how to:
//! - Wrap handlers with [`FailoverDispatcher`] and an error-kind allowlist.
//! - Let a [`CircuitBreakerDispatcher`] count failures of the whole group.
//! - Reject new tasks by cancelling the breaker's gate.
//!
//! ## Flow
//! ```text
//! CircuitBreaker ──► Failover
//!                      ├─► primary   (fails every other call)
//!                      ├─► replica-a (tokio task)
//!                      └─► replica-b (tokio task)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example failover
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskmux::{
    CircuitBreakerConfig, CircuitBreakerDispatcher, ErrorKind, FailoverConfig, FailoverDispatcher,
    Handler, HandlerExt, HandlerFn, HandlerRef, SpawnHandler, Task, Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("primary refused connection")]
struct Refused;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // 1. A primary that fails every other call.
    let calls = Arc::new(AtomicUsize::new(0));
    let primary: HandlerRef = {
        let calls = Arc::clone(&calls);
        HandlerFn::arc("primary", move |task: &mut Task| {
            if calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(Refused);
            }
            task.set_property("served_by", Value::from("primary"));
            Ok(())
        })
    };

    // 2. Two replicas that answer from the runtime.
    let replicas = ["replica-a", "replica-b"].map(|name| -> HandlerRef {
        SpawnHandler::arc(name, move |mut task: Task| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            task.set_property("served_by", Value::from(name));
            task
        })
    });

    // 3. Failover on `Refused` only, at most two failovers per task.
    let group = FailoverDispatcher::with_handlers(
        FailoverConfig {
            max_attempts: 2,
            ..FailoverConfig::default().on_error(ErrorKind::of::<Refused>())
        },
        std::iter::once(primary).chain(replicas),
    );

    // 4. Breaker around the whole group.
    let breaker = CircuitBreakerDispatcher::new(
        Arc::new(group),
        CircuitBreakerConfig {
            threshold: 3,
            half_open_after: Duration::from_secs(5),
            ..Default::default()
        },
    );
    breaker.start()?;

    for i in 0..6 {
        let task = breaker.call(Task::new(format!("request-{i}"))).await?;
        let served = task
            .property("served_by")
            .and_then(Value::as_str)
            .unwrap_or("nobody");
        println!(
            "[demo] task {} served by {served} (failed: {})",
            task.id(),
            task.is_failed()
        );
    }

    // 5. Forced shutdown: the breaker rejects everything from now on.
    breaker.gate().cancel();
    let rejected = breaker.call(Task::new("late")).await?;
    println!(
        "[demo] after shutdown: {}",
        rejected.error().map(|e| e.to_string()).unwrap_or_default()
    );

    breaker.stop()?;
    Ok(())
}
