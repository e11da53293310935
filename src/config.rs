//! # Dispatcher configuration.
//!
//! Plain structs consumed at construction time. Fields are public; prefer the
//! helper accessors over sprinkling sentinel checks across the codebase.
//!
//! ## Sentinel values
//! - `FailoverConfig::max_attempts = -1` → unbounded retries
//! - `StickyConfig::number_of_hash_groups <= 0` → raw hash used as bucket
//! - empty `errors` allowlist → every failure qualifies

use std::time::Duration;

use crate::error::{DispatchError, ErrorKind};

/// Default number of sticky hash buckets.
pub const DEFAULT_HASH_GROUPS: i64 = 65_536;

/// Default delimiter for distribution ratio strings.
pub const DEFAULT_RATIO_DELIMITER: &str = ",";

/// Failover dispatcher settings.
///
/// ## Field semantics
/// - `errors`: failure kinds that trigger failover (empty = any failure)
/// - `round_robin`: rotate the starting handler across top-level calls and wrap
///   past the last handler within a call
/// - `sticky`: start at the last known good handler (ignored when `round_robin` is set)
/// - `max_attempts`: failover attempts after the first try (`-1` = unbounded)
#[derive(Clone, Debug)]
pub struct FailoverConfig {
    pub errors: Vec<ErrorKind>,
    pub round_robin: bool,
    pub sticky: bool,
    pub max_attempts: i32,
}

impl FailoverConfig {
    /// Returns the attempt budget as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` failover attempts
    #[inline]
    pub fn attempt_limit(&self) -> Option<u32> {
        u32::try_from(self.max_attempts).ok()
    }

    /// Builder-style allowlist entry.
    pub fn on_error(mut self, kind: ErrorKind) -> Self {
        self.errors.push(kind);
        self
    }
}

impl Default for FailoverConfig {
    /// Default configuration:
    ///
    /// - `errors = []` (any failure triggers failover)
    /// - `round_robin = false`
    /// - `sticky = false`
    /// - `max_attempts = -1` (unbounded)
    fn default() -> Self {
        Self {
            errors: Vec::new(),
            round_robin: false,
            sticky: false,
            max_attempts: -1,
        }
    }
}

/// Circuit breaker settings.
///
/// - `threshold`: consecutive failures that open the circuit; `0` is rejected by
///   `start()` and treated as `1` when the breaker was never started
/// - `half_open_after`: how long the circuit stays open after the last failure
/// - `errors`: failure kinds that count (empty = any failure)
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub half_open_after: Duration,
    pub errors: Vec<ErrorKind>,
}

impl CircuitBreakerConfig {
    /// Threshold clamped to a minimum of 1.
    #[inline]
    pub fn threshold_clamped(&self) -> u32 {
        self.threshold.max(1)
    }
}

impl Default for CircuitBreakerConfig {
    /// Default configuration:
    ///
    /// - `threshold = 5`
    /// - `half_open_after = 30s`
    /// - `errors = []`
    fn default() -> Self {
        Self {
            threshold: 5,
            half_open_after: Duration::from_secs(30),
            errors: Vec::new(),
        }
    }
}

/// Sticky strategy settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StickyConfig {
    /// Number of hash buckets keys are folded into (`<= 0` = raw hash).
    pub number_of_hash_groups: i64,
}

impl Default for StickyConfig {
    /// Returns `number_of_hash_groups = 65536`.
    fn default() -> Self {
        Self {
            number_of_hash_groups: DEFAULT_HASH_GROUPS,
        }
    }
}

/// Weighted strategy settings: one weight per handler, in registration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightedConfig {
    pub weights: Vec<u32>,
}

impl WeightedConfig {
    /// Creates a config from explicit weights.
    pub fn new(weights: impl Into<Vec<u32>>) -> Self {
        Self {
            weights: weights.into(),
        }
    }

    /// Parses a ratio string such as `"4,2,1"` using the default delimiter.
    ///
    /// # Example
    /// ```
    /// use taskmux::WeightedConfig;
    ///
    /// let cfg = WeightedConfig::from_ratio("4, 2,1").unwrap();
    /// assert_eq!(cfg.weights, vec![4, 2, 1]);
    /// assert!(WeightedConfig::from_ratio("4,-1").is_err());
    /// ```
    pub fn from_ratio(ratio: &str) -> Result<Self, DispatchError> {
        Self::from_ratio_with(ratio, DEFAULT_RATIO_DELIMITER)
    }

    /// Parses a ratio string with a custom delimiter.
    pub fn from_ratio_with(ratio: &str, delimiter: &str) -> Result<Self, DispatchError> {
        if delimiter.is_empty() {
            return Err(DispatchError::InvalidConfiguration(
                "empty ratio delimiter".to_string(),
            ));
        }
        let weights = ratio
            .split(delimiter)
            .map(str::trim)
            .map(|part| {
                part.parse::<u32>().map_err(|e| {
                    DispatchError::InvalidConfiguration(format!("ratio entry {part:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { weights })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_limit_sentinel() {
        let mut cfg = FailoverConfig::default();
        assert_eq!(cfg.attempt_limit(), None);
        cfg.max_attempts = 0;
        assert_eq!(cfg.attempt_limit(), Some(0));
        cfg.max_attempts = 3;
        assert_eq!(cfg.attempt_limit(), Some(3));
    }

    #[test]
    fn ratio_with_custom_delimiter() {
        let cfg = WeightedConfig::from_ratio_with("3;1", ";").unwrap();
        assert_eq!(cfg.weights, vec![3, 1]);
        assert!(WeightedConfig::from_ratio_with("3,1", ";").is_err());
        assert!(WeightedConfig::from_ratio_with("3,1", "").is_err());
    }

    #[test]
    fn sticky_default_groups() {
        assert_eq!(StickyConfig::default().number_of_hash_groups, 65_536);
    }

    #[test]
    fn threshold_is_clamped() {
        let cfg = CircuitBreakerConfig {
            threshold: 0,
            ..Default::default()
        };
        assert_eq!(cfg.threshold_clamped(), 1);
    }
}
