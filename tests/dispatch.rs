use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taskmux::{
    BroadcastDispatcher, CircuitBreakerConfig, CircuitBreakerDispatcher, Continuation,
    DispatchError, ErrorKind, FailoverConfig, FailoverDispatcher, Handler, HandlerExt, HandlerFn,
    HandlerRef, QueueDispatcher, RandomStrategy, SpawnHandler, StickyStrategy, Task, Value,
    WeightedConfig, WeightedRoundRobinStrategy,
};

#[derive(Debug, thiserror::Error)]
#[error("{0} unavailable")]
struct Unavailable(&'static str);

/// Completes from a plain OS thread, outside any runtime.
struct ThreadHandler {
    name: &'static str,
    fail: bool,
    calls: AtomicUsize,
}

impl ThreadHandler {
    fn arc(name: &'static str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Handler for ThreadHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&self, mut task: Task, done: Continuation) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (name, fail) = (self.name, self.fail);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(2));
            if fail {
                task.set_error(Unavailable(name));
            } else {
                task.set_property("served_by", Value::from(name));
            }
            done.complete(task, false);
        });
        false
    }
}

fn served_by(task: &Task) -> Option<&str> {
    task.property("served_by").and_then(Value::as_str)
}

#[test]
fn failover_across_os_threads_completes_once() {
    let a = ThreadHandler::arc("a", true);
    let b = ThreadHandler::arc("b", true);
    let c = ThreadHandler::arc("c", false);
    let failover = FailoverDispatcher::with_handlers(
        FailoverConfig::default().on_error(ErrorKind::of::<Unavailable>()),
        [
            Arc::clone(&a) as HandlerRef,
            Arc::clone(&b) as HandlerRef,
            Arc::clone(&c) as HandlerRef,
        ],
    );

    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    let (tx, rx) = std::sync::mpsc::channel();
    let done = Continuation::new(move |task: Task, sync| {
        counter.fetch_add(1, Ordering::SeqCst);
        tx.send((task, sync)).unwrap();
    });

    assert!(!failover.process(Task::new(()), done));
    let (task, sync) = rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert!(!sync);
    assert!(!task.is_failed());
    assert_eq!(served_by(&task), Some("c"));
    assert_eq!(
        [&a, &b, &c].map(|h| h.calls.load(Ordering::SeqCst)),
        [1, 1, 1]
    );
    thread::sleep(Duration::from_millis(20));
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nested_dispatchers_compose() {
    let pool = QueueDispatcher::with_handlers(
        WeightedRoundRobinStrategy::new(&WeightedConfig::new([2, 1])),
        ["pool-1", "pool-2"].map(|name| -> HandlerRef {
            SpawnHandler::arc(name, move |mut task: Task| async move {
                tokio::task::yield_now().await;
                task.set_property("served_by", Value::from(name));
                task
            })
        }),
    );
    let flaky: HandlerRef = HandlerFn::arc("flaky", |_t: &mut Task| {
        Err::<(), _>(Unavailable("flaky"))
    });
    let failover: HandlerRef = Arc::new(FailoverDispatcher::with_handlers(
        FailoverConfig::default(),
        [flaky, Arc::new(pool) as HandlerRef],
    ));
    let breaker = CircuitBreakerDispatcher::new(failover, CircuitBreakerConfig::default());
    breaker.start().unwrap();

    let mut seen = Vec::new();
    for _ in 0..6 {
        let task = breaker.call(Task::new(())).await.unwrap();
        assert!(!task.is_failed());
        seen.push(served_by(&task).unwrap_or_default().to_string());
    }
    assert_eq!(
        seen,
        ["pool-1", "pool-2", "pool-1", "pool-1", "pool-2", "pool-1"]
    );
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_of_async_failovers_reports_first_failure() {
    let ok_branch: HandlerRef = Arc::new(FailoverDispatcher::with_handlers(
        FailoverConfig::default(),
        [ThreadHandler::arc("x1", true) as HandlerRef, ThreadHandler::arc("x2", false) as HandlerRef],
    ));
    let dead_branch: HandlerRef = Arc::new(FailoverDispatcher::with_handlers(
        FailoverConfig {
            max_attempts: 0,
            ..Default::default()
        },
        [ThreadHandler::arc("y1", true) as HandlerRef, ThreadHandler::arc("y2", false) as HandlerRef],
    ));
    let never = ThreadHandler::arc("z", false);

    let broadcast = BroadcastDispatcher::with_handlers([
        ok_branch,
        dead_branch,
        Arc::clone(&never) as HandlerRef,
    ]);

    let task = broadcast.call(Task::new(())).await.unwrap();
    assert_eq!(task.error_as::<Unavailable>().map(|e| e.0), Some("y1"));
    assert_eq!(never.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_survive_registry_churn() {
    let queue = Arc::new(QueueDispatcher::new(RandomStrategy::new()));
    let anchor: HandlerRef = HandlerFn::arc("anchor", |_t: &mut Task| Ok::<_, std::io::Error>(()));
    queue.add(Arc::clone(&anchor));

    let churn = {
        let queue = Arc::clone(&queue);
        tokio::task::spawn_blocking(move || {
            for i in 0..200 {
                let h: HandlerRef = HandlerFn::arc(format!("tmp-{i}"), |_t: &mut Task| {
                    Ok::<_, std::io::Error>(())
                });
                queue.add(Arc::clone(&h));
                queue.remove(&h);
            }
        })
    };

    let mut joins = Vec::new();
    for _ in 0..64 {
        let queue = Arc::clone(&queue);
        joins.push(tokio::spawn(async move { queue.call(Task::new(())).await }));
    }
    for j in joins {
        let task = j.await.unwrap().unwrap();
        assert!(!task.is_failed());
    }
    churn.await.unwrap();
    assert_eq!(queue.list().len(), 1);
}

#[test]
fn sticky_queue_keeps_affinity_per_key() {
    let queue = QueueDispatcher::with_handlers(
        StickyStrategy::new(|t: &Task| t.property("customer").cloned()),
        ["s1", "s2", "s3"].map(|name| -> HandlerRef {
            HandlerFn::arc(name, move |t: &mut Task| {
                t.set_property("served_by", Value::from(name));
                Ok::<_, std::io::Error>(())
            })
        }),
    );

    for customer in ["acme", "globex", "initech"] {
        let first = queue
            .call_blocking(Task::new(()).with_property("customer", customer))
            .unwrap();
        let owner = served_by(&first).map(str::to_owned);
        for _ in 0..5 {
            let again = queue
                .call_blocking(Task::new(()).with_property("customer", customer))
                .unwrap();
            assert_eq!(served_by(&again).map(str::to_owned), owner);
        }
    }
}

#[test]
fn start_errors_surface_from_nested_start() {
    let inner = QueueDispatcher::with_handlers(
        WeightedRoundRobinStrategy::new(&WeightedConfig::new([1])),
        [
            HandlerFn::arc("a", |_t: &mut Task| Ok::<_, std::io::Error>(())) as HandlerRef,
            HandlerFn::arc("b", |_t: &mut Task| Ok::<_, std::io::Error>(())) as HandlerRef,
        ],
    );
    let outer = FailoverDispatcher::with_handlers(FailoverConfig::default(), [Arc::new(inner) as HandlerRef]);
    assert!(matches!(
        outer.start(),
        Err(DispatchError::ConfigurationMismatch {
            expected: 1,
            actual: 2
        })
    ));
}
