//! # Weighted distribution table.
//!
//! Shared state for [`WeightedRoundRobinStrategy`](super::WeightedRoundRobinStrategy)
//! and [`WeightedRandomStrategy`](super::WeightedRandomStrategy).
//!
//! One [`DistributionEntry`] per handler, in registration order. A *round* lasts
//! until every runtime weight is spent; the table is then reset to the configured
//! weights.
//!
//! ## Rules
//! - `entries.len() == handlers.len()` must hold when the dispatcher starts.
//! - The table is never shared between dispatcher instances.

use std::sync::Arc;

use tracing::warn;

use crate::config::WeightedConfig;
use crate::error::DispatchError;
use crate::handlers::HandlerRef;

/// Configured and remaining share of one handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistributionEntry {
    /// Handler index in the registry snapshot.
    pub position: usize,
    /// Configured share per round.
    pub distribution_weight: u32,
    /// Share left in the current round.
    pub runtime_weight: u32,
}

impl DistributionEntry {
    fn new(position: usize, weight: u32) -> Self {
        Self {
            position,
            distribution_weight: weight,
            runtime_weight: weight,
        }
    }
}

/// Ordered distribution entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionTable {
    entries: Vec<DistributionEntry>,
}

impl DistributionTable {
    /// Builds a table from the configured weights.
    pub fn new(cfg: &WeightedConfig) -> Self {
        let entries = cfg
            .weights
            .iter()
            .enumerate()
            .map(|(position, &w)| DistributionEntry::new(position, w))
            .collect();
        Self { entries }
    }

    /// Entries in handler order.
    pub fn entries(&self) -> &[DistributionEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [DistributionEntry] {
        &mut self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no weights were configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` if every runtime weight is spent.
    pub fn is_exhausted(&self) -> bool {
        self.entries.iter().all(|e| e.runtime_weight == 0)
    }

    /// Restores every runtime weight to its configured value.
    pub fn reset(&mut self) {
        for e in &mut self.entries {
            e.runtime_weight = e.distribution_weight;
        }
    }

    /// Sum of configured weights.
    pub fn total_weight(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.distribution_weight))
            .sum()
    }

    /// Sum of weights left in the current round.
    pub fn remaining_weight(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.runtime_weight))
            .sum()
    }

    /// Resolves a picked position against the current snapshot.
    ///
    /// Handlers removed after `start` leave positions without a handler; those
    /// picks yield `None`.
    pub(crate) fn resolve(&self, handlers: &[HandlerRef], position: usize) -> Option<HandlerRef> {
        if self.entries.len() != handlers.len() {
            warn!(
                weights = self.entries.len(),
                handlers = handlers.len(),
                position,
                "distribution table does not match registered handlers"
            );
        }
        handlers.get(position).map(Arc::clone)
    }

    /// Fails with `ConfigurationMismatch` unless there is one entry per handler.
    pub fn validate(&self, handlers: usize) -> Result<(), DispatchError> {
        if self.entries.len() != handlers {
            return Err(DispatchError::ConfigurationMismatch {
                expected: self.entries.len(),
                actual: handlers,
            });
        }
        Ok(())
    }
}
