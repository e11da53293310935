//! Error types used by the dispatch core.
//!
//! This module defines:
//!
//! - [`DispatchError`]: errors raised by dispatchers and strategies themselves.
//! - [`ErrorKind`]: a named matcher used by failover and circuit-breaker allowlists.
//!
//! Handler failures are opaque: any `std::error::Error + Send + Sync` a handler
//! stores in the task's error slot. [`DispatchError`] only covers failures the
//! dispatch core produces on its own.

use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the dispatch core.
///
/// Dispatch-time variants are stored in the task's error slot (the caller's
/// continuation still fires exactly once). Start-time variants are returned
/// from `start()`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Registry was empty at dispatch time.
    #[error("no handlers available")]
    NoHandlersAvailable,

    /// Strategy returned nothing although the registry was not empty.
    #[error("selection strategy chose no handler")]
    NoHandlerChosen,

    /// Weighted distribution table and registry disagree in size.
    #[error("distribution has {expected} weights but {actual} handlers are registered")]
    ConfigurationMismatch {
        /// Number of configured weights.
        expected: usize,
        /// Number of registered handlers.
        actual: usize,
    },

    /// Configuration could not be interpreted (bad ratio string, zero threshold, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The dispatcher refused the task (forced shutdown in progress).
    #[error("rejected: {reason}")]
    Rejected {
        /// Why the task was refused.
        reason: String,
    },

    /// A handler dropped its continuation without completing it.
    #[error("handler abandoned the task without completing it")]
    Abandoned,

    /// A handler panicked while processing the task.
    #[error("handler {handler} panicked: {info}")]
    HandlerPanicked {
        /// Name of the handler.
        handler: String,
        /// Panic message, if it was a string.
        info: String,
    },

    /// Circuit breaker judged the circuit open for this call.
    #[error("circuit open: {failures} failures, last one {since_last_failure:?} ago")]
    CircuitOpen {
        /// Failure count at the time of the check.
        failures: u32,
        /// Time elapsed since the last recorded failure.
        since_last_failure: Duration,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskmux::DispatchError;
    ///
    /// assert_eq!(DispatchError::NoHandlersAvailable.as_label(), "no_handlers_available");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::NoHandlersAvailable => "no_handlers_available",
            DispatchError::NoHandlerChosen => "no_handler_chosen",
            DispatchError::ConfigurationMismatch { .. } => "configuration_mismatch",
            DispatchError::InvalidConfiguration(_) => "invalid_configuration",
            DispatchError::Rejected { .. } => "rejected",
            DispatchError::Abandoned => "abandoned",
            DispatchError::HandlerPanicked { .. } => "handler_panicked",
            DispatchError::CircuitOpen { .. } => "circuit_open",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::NoHandlersAvailable => "registry is empty".to_string(),
            DispatchError::NoHandlerChosen => "strategy returned no handler".to_string(),
            DispatchError::ConfigurationMismatch { expected, actual } => {
                format!("weights={expected} handlers={actual}")
            }
            DispatchError::InvalidConfiguration(msg) => format!("config: {msg}"),
            DispatchError::Rejected { reason } => format!("rejected: {reason}"),
            DispatchError::Abandoned => "continuation dropped".to_string(),
            DispatchError::HandlerPanicked { handler, info } => {
                format!("panic: handler={handler} info={info}")
            }
            DispatchError::CircuitOpen {
                failures,
                since_last_failure,
            } => format!("open: failures={failures} since={since_last_failure:?}"),
        }
    }

    /// Indicates whether the error points at a broken configuration.
    ///
    /// Such errors are never retried by failover.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::NoHandlersAvailable
                | DispatchError::NoHandlerChosen
                | DispatchError::ConfigurationMismatch { .. }
                | DispatchError::InvalidConfiguration(_)
        )
    }
}

/// # Error kind matcher.
///
/// Identifies a concrete error type so that allowlists can ask
/// "does this task carry an error of kind X, directly or in its cause chain".
///
/// # Example
/// ```
/// use taskmux::{DispatchError, ErrorKind};
///
/// let kind = ErrorKind::of::<std::io::Error>();
/// let err = std::io::Error::other("disk");
/// assert!(kind.matches(&err));
/// assert!(!kind.matches(&DispatchError::NoHandlerChosen));
/// ```
#[derive(Clone, Copy)]
pub struct ErrorKind {
    name: &'static str,
    is: fn(&(dyn StdError + 'static)) -> bool,
}

impl ErrorKind {
    /// Creates a matcher for errors of type `E`.
    pub fn of<E: StdError + 'static>() -> Self {
        Self {
            name: type_name::<E>(),
            is: |err| err.is::<E>(),
        }
    }

    /// Type name of the matched error (for logs).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if `err` itself is of this kind (no cause walk).
    pub fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        (self.is)(err)
    }

    /// Returns `true` if `err` or any error in its `source()` chain is of this kind.
    pub fn matches_chain(&self, err: &(dyn StdError + 'static)) -> bool {
        let mut current = Some(err);
        while let Some(e) = current {
            if self.matches(e) {
                return true;
            }
            current = e.source();
        }
        false
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorKind").field(&self.name).finish()
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Returns `true` when `err` passes the allowlist (an empty allowlist admits everything).
pub(crate) fn allowlisted(kinds: &[ErrorKind], err: &(dyn StdError + 'static)) -> bool {
    kinds.is_empty() || kinds.iter().any(|k| k.matches_chain(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("wrapped")]
    struct Wrapper(#[source] std::io::Error);

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            DispatchError::ConfigurationMismatch {
                expected: 2,
                actual: 3
            }
            .as_label(),
            "configuration_mismatch"
        );
        assert_eq!(
            DispatchError::Rejected {
                reason: "x".into()
            }
            .as_label(),
            "rejected"
        );
    }

    #[test]
    fn kind_walks_cause_chain() {
        let err = Wrapper(std::io::Error::other("inner"));
        let io = ErrorKind::of::<std::io::Error>();
        assert!(!io.matches(&err));
        assert!(io.matches_chain(&err));
        assert!(ErrorKind::of::<Wrapper>().matches(&err));
    }

    #[test]
    fn empty_allowlist_admits_everything() {
        let err = DispatchError::NoHandlerChosen;
        assert!(allowlisted(&[], &err));
        assert!(!allowlisted(&[ErrorKind::of::<std::io::Error>()], &err));
        assert!(allowlisted(&[ErrorKind::of::<DispatchError>()], &err));
    }

    #[test]
    fn configuration_errors_are_flagged() {
        assert!(DispatchError::NoHandlersAvailable.is_configuration());
        assert!(!DispatchError::Rejected {
            reason: "stop".into()
        }
        .is_configuration());
    }
}
