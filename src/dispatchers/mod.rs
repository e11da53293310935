//! # Dispatchers.
//!
//! Every dispatcher owns a [`Registry`](crate::Registry) and implements
//! [`Handler`](crate::Handler), so dispatchers nest inside each other.
//!
//! | Dispatcher                     | Destinations per task | Failure behaviour                              |
//! |--------------------------------|-----------------------|------------------------------------------------|
//! | [`QueueDispatcher`]            | one (strategy-chosen) | surfaced unchanged                             |
//! | [`BroadcastDispatcher`]        | all, in order         | first failure stops the broadcast              |
//! | [`FailoverDispatcher`]         | one, then the next    | retried on the next handler within budget      |
//! | [`CircuitBreakerDispatcher`]   | the first handler     | counted; task marked while the circuit is open |

mod broadcast;
mod circuit_breaker;
mod failover;
mod queue;
mod trampoline;

pub use broadcast::BroadcastDispatcher;
pub use circuit_breaker::{CircuitBreakerDispatcher, CircuitState};
pub use failover::FailoverDispatcher;
pub use queue::QueueDispatcher;
