//! # Sticky (affinity) selection.
//!
//! [`StickyStrategy`] routes tasks with the same correlation key to the same
//! handler for as long as that handler stays registered.
//!
//! ## Flow
//! ```text
//! key = extractor(task)
//! bucket = hash(key) % number_of_hash_groups     (raw hash if groups <= 0)
//!   ├─► bucket cached, handler registered ─► cached handler
//!   └─► bucket unmapped or handler gone    ─► round-robin pick ─► cache ─► handler
//! ```
//!
//! ## Rules
//! - Distinct keys may share a bucket (and therefore a handler); this bounds memory.
//! - Removing a handler purges **every** bucket mapped to it; the next task with
//!   one of those keys gets a fresh round-robin assignment.
//! - The hash is a plain `DefaultHasher` digest; ordering or cryptographic
//!   strength are not needed.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::config::StickyConfig;
use crate::handlers::{same_handler, HandlerRef};
use crate::strategies::{RoundRobinStrategy, SelectionStrategy};
use crate::tasks::Task;

/// Routes tasks with equal correlation keys to the same handler.
pub struct StickyStrategy<F> {
    extractor: F,
    number_of_hash_groups: i64,
    buckets: DashMap<u64, HandlerRef>,
    round_robin: RoundRobinStrategy,
}

impl<F, K> StickyStrategy<F>
where
    F: Fn(&Task) -> K + Send + Sync + 'static,
    K: Hash,
{
    /// Creates a sticky strategy with the default number of hash groups.
    pub fn new(extractor: F) -> Self {
        Self::with_config(extractor, StickyConfig::default())
    }

    /// Creates a sticky strategy with explicit configuration.
    pub fn with_config(extractor: F, cfg: StickyConfig) -> Self {
        Self {
            extractor,
            number_of_hash_groups: cfg.number_of_hash_groups,
            buckets: DashMap::new(),
            round_robin: RoundRobinStrategy::new(),
        }
    }

    /// Bucket the given key falls into.
    pub fn bucket_of(&self, key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let raw = hasher.finish();
        if self.number_of_hash_groups > 0 {
            raw % self.number_of_hash_groups as u64
        } else {
            raw
        }
    }

    /// Number of buckets currently holding an assignment.
    pub fn cached_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if some bucket is mapped to `handler`.
    pub fn is_cached(&self, handler: &HandlerRef) -> bool {
        self.buckets.iter().any(|e| same_handler(e.value(), handler))
    }
}

impl<F, K> SelectionStrategy for StickyStrategy<F>
where
    F: Fn(&Task) -> K + Send + Sync + 'static,
    K: Hash,
{
    fn name(&self) -> &'static str {
        "sticky"
    }

    fn select(&self, handlers: &[HandlerRef], task: &Task) -> Option<HandlerRef> {
        let key = (self.extractor)(task);
        let bucket = self.bucket_of(&key);

        match self.buckets.entry(bucket) {
            Entry::Occupied(mut cached) => {
                if handlers.iter().any(|h| same_handler(h, cached.get())) {
                    return Some(Arc::clone(cached.get()));
                }
                // Assigned from a snapshot taken before the handler was removed.
                let chosen = self.round_robin.select(handlers, task)?;
                debug!(
                    bucket,
                    stale = cached.get().name(),
                    handler = chosen.name(),
                    "reassigned sticky bucket"
                );
                cached.insert(Arc::clone(&chosen));
                Some(chosen)
            }
            Entry::Vacant(slot) => {
                let chosen = self.round_robin.select(handlers, task)?;
                debug!(bucket, handler = chosen.name(), "assigned sticky bucket");
                slot.insert(Arc::clone(&chosen));
                Some(chosen)
            }
        }
    }

    fn on_remove(&self, handler: &HandlerRef) {
        let before = self.buckets.len();
        self.buckets.retain(|_, cached| !same_handler(cached, handler));
        debug!(
            handler = handler.name(),
            purged = before.saturating_sub(self.buckets.len()),
            "purged sticky buckets"
        );
    }
}

impl<F> std::fmt::Debug for StickyStrategy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickyStrategy")
            .field("number_of_hash_groups", &self.number_of_hash_groups)
            .field("cached_buckets", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerFn;
    use crate::tasks::Value;

    fn handlers(n: usize) -> Vec<HandlerRef> {
        (0..n)
            .map(|i| -> HandlerRef {
                HandlerFn::arc(format!("h{i}"), |_t: &mut Task| Ok::<_, std::io::Error>(()))
            })
            .collect()
    }

    fn by_customer(task: &Task) -> Option<Value> {
        task.property("customer").cloned()
    }

    fn task_for(customer: &str) -> Task {
        Task::new(()).with_property("customer", customer)
    }

    #[test]
    fn same_key_same_handler() {
        let hs = handlers(3);
        let s = StickyStrategy::new(by_customer);

        let first = s.select(&hs, &task_for("acme")).unwrap();
        for _ in 0..20 {
            let again = s.select(&hs, &task_for("acme")).unwrap();
            assert!(same_handler(&first, &again));
        }
    }

    #[test]
    fn default_groups_spread_new_keys_round_robin() {
        let hs = handlers(2);
        let s = StickyStrategy::new(by_customer);

        let a = s.select(&hs, &task_for("a")).unwrap();
        let b = s.select(&hs, &task_for("b")).unwrap();
        if s.cached_buckets() == 2 {
            assert!(!same_handler(&a, &b));
        }
    }

    #[test]
    fn remove_purges_and_reassigns() {
        let hs = handlers(2);
        let s = StickyStrategy::new(by_customer);

        let first = s.select(&hs, &task_for("acme")).unwrap();
        assert!(s.is_cached(&first));

        s.on_remove(&first);
        assert!(!s.is_cached(&first));

        let remaining: Vec<HandlerRef> = hs
            .iter()
            .filter(|h| !same_handler(h, &first))
            .cloned()
            .collect();
        let next = s.select(&remaining, &task_for("acme")).unwrap();
        assert!(!same_handler(&next, &first));
    }

    #[test]
    fn small_group_count_shares_buckets() {
        let hs = handlers(3);
        let s = StickyStrategy::with_config(
            by_customer,
            StickyConfig {
                number_of_hash_groups: 2,
            },
        );

        for i in 0..100 {
            let key = format!("customer-{i}");
            let h = s.select(&hs, &task_for(&key)).unwrap();
            let again = s.select(&hs, &task_for(&key)).unwrap();
            assert!(same_handler(&h, &again));
        }
        assert!(s.cached_buckets() <= 2);
    }

    #[test]
    fn non_positive_groups_use_raw_hash() {
        let s = StickyStrategy::with_config(
            |_t: &Task| 0u8,
            StickyConfig {
                number_of_hash_groups: 0,
            },
        );
        let mut hasher = DefaultHasher::new();
        7u8.hash(&mut hasher);
        assert_eq!(s.bucket_of(&7u8), hasher.finish());
    }

    #[test]
    fn cached_handler_missing_from_snapshot_is_replaced() {
        let hs = handlers(2);
        let s = StickyStrategy::new(by_customer);

        let first = s.select(&hs, &task_for("acme")).unwrap();
        let remaining: Vec<HandlerRef> = hs
            .iter()
            .filter(|h| !same_handler(h, &first))
            .cloned()
            .collect();

        let next = s.select(&remaining, &task_for("acme")).unwrap();
        assert!(same_handler(&next, &remaining[0]));
        assert!(!s.is_cached(&first));
        assert!(same_handler(&s.select(&remaining, &task_for("acme")).unwrap(), &next));
    }

    #[test]
    fn removal_purges_all_buckets_of_handler() {
        let hs = handlers(1);
        let s = StickyStrategy::new(by_customer);
        for i in 0..10 {
            s.select(&hs, &task_for(&format!("c{i}")));
        }
        assert!(s.cached_buckets() > 1);

        s.on_remove(&hs[0]);
        assert_eq!(s.cached_buckets(), 0);
    }
}
