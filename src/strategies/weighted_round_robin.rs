//! # Weighted round-robin selection.
//!
//! Strict round-robin over the distribution table where each handler is visited
//! as long as it still has runtime weight left in the current round.
//!
//! ## Algorithm
//! ```text
//! exhausted? ─► reset table, counter = 0
//! scan from counter (wrapping) ─► first entry with runtime_weight > 0
//!   ─► runtime_weight -= 1, last_index = position, counter = position + 1
//! ```
//!
//! Weights `[3, 1]` over `[A, B]` produce `A, B, A, A` per round; every round
//! holds exactly three `A` and one `B` and repeats identically.

use parking_lot::Mutex;
use tracing::trace;

use crate::config::WeightedConfig;
use crate::error::DispatchError;
use crate::handlers::HandlerRef;
use crate::strategies::{DistributionTable, SelectionStrategy};
use crate::tasks::Task;

#[derive(Debug)]
struct State {
    table: DistributionTable,
    counter: usize,
    last_index: Option<usize>,
}

/// Weighted round-robin strategy.
#[derive(Debug)]
pub struct WeightedRoundRobinStrategy {
    state: Mutex<State>,
}

impl WeightedRoundRobinStrategy {
    /// Creates the strategy with one entry per configured weight.
    pub fn new(cfg: &WeightedConfig) -> Self {
        Self {
            state: Mutex::new(State {
                table: DistributionTable::new(cfg),
                counter: 0,
                last_index: None,
            }),
        }
    }

    /// Builds the strategy from a ratio string such as `"3,1"`.
    pub fn from_ratio(ratio: &str) -> Result<Self, DispatchError> {
        Ok(Self::new(&WeightedConfig::from_ratio(ratio)?))
    }

    /// Index chosen by the most recent call.
    pub fn last_index(&self) -> Option<usize> {
        self.state.lock().last_index
    }

    /// Copy of the current distribution table.
    pub fn table(&self) -> DistributionTable {
        self.state.lock().table.clone()
    }
}

impl SelectionStrategy for WeightedRoundRobinStrategy {
    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }

    fn select(&self, handlers: &[HandlerRef], _task: &Task) -> Option<HandlerRef> {
        let mut st = self.state.lock();
        let len = st.table.len();
        if len == 0 {
            return None;
        }
        if st.table.is_exhausted() {
            st.table.reset();
            st.counter = 0;
        }

        let start = st.counter % len;
        let position = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| st.table.entries()[i].runtime_weight > 0)?;

        let entry = &mut st.table.entries_mut()[position];
        entry.runtime_weight -= 1;
        let chosen = entry.position;

        st.last_index = Some(chosen);
        st.counter = (position + 1) % len;
        trace!(index = chosen, "weighted round-robin pick");

        st.table.resolve(handlers, chosen)
    }

    fn validate(&self, handlers: &[HandlerRef]) -> Result<(), DispatchError> {
        self.state.lock().table.validate(handlers.len())
    }
}
