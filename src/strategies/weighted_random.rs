//! # Weighted random selection.
//!
//! Weighted sampling without replacement: within a round every handler is drawn
//! exactly `distribution_weight` times, in random order. When the remaining sum
//! reaches zero the table is reset and a new round starts.

use parking_lot::Mutex;
use rand::Rng;
use tracing::trace;

use crate::config::WeightedConfig;
use crate::error::DispatchError;
use crate::handlers::HandlerRef;
use crate::strategies::{DistributionTable, SelectionStrategy};
use crate::tasks::Task;

#[derive(Debug)]
struct State {
    table: DistributionTable,
    remaining_sum: u64,
    last_index: Option<usize>,
}

/// Weighted random strategy.
#[derive(Debug)]
pub struct WeightedRandomStrategy {
    state: Mutex<State>,
}

impl WeightedRandomStrategy {
    /// Creates the strategy; the first round holds the full weight sum.
    pub fn new(cfg: &WeightedConfig) -> Self {
        let table = DistributionTable::new(cfg);
        let remaining_sum = table.total_weight();
        Self {
            state: Mutex::new(State {
                table,
                remaining_sum,
                last_index: None,
            }),
        }
    }

    /// Builds the strategy from a ratio string such as `"4,2,1"`.
    pub fn from_ratio(ratio: &str) -> Result<Self, DispatchError> {
        Ok(Self::new(&WeightedConfig::from_ratio(ratio)?))
    }

    /// Index chosen by the most recent call.
    pub fn last_index(&self) -> Option<usize> {
        self.state.lock().last_index
    }

    /// Sum of weights left in the current round.
    pub fn remaining_sum(&self) -> u64 {
        self.state.lock().remaining_sum
    }
}

impl SelectionStrategy for WeightedRandomStrategy {
    fn name(&self) -> &'static str {
        "weighted_random"
    }

    fn select(&self, handlers: &[HandlerRef], _task: &Task) -> Option<HandlerRef> {
        let mut st = self.state.lock();
        if st.remaining_sum == 0 {
            st.table.reset();
            st.remaining_sum = st.table.total_weight();
            if st.remaining_sum == 0 {
                return None;
            }
        }

        let r = rand::rng().random_range(0..st.remaining_sum);
        let mut acc = 0u64;
        let mut picked = None;
        for entry in st.table.entries_mut() {
            acc += u64::from(entry.runtime_weight);
            if acc > r {
                entry.runtime_weight -= 1;
                picked = Some(entry.position);
                break;
            }
        }
        let chosen = picked?;

        st.remaining_sum -= 1;
        st.last_index = Some(chosen);
        trace!(index = chosen, remaining = st.remaining_sum, "weighted random pick");

        st.table.resolve(handlers, chosen)
    }

    fn validate(&self, handlers: &[HandlerRef]) -> Result<(), DispatchError> {
        self.state.lock().table.validate(handlers.len())
    }
}
