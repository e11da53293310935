//! # Handler selection strategies.
//!
//! Strategies pick one handler out of a registry snapshot for a
//! [`QueueDispatcher`](crate::QueueDispatcher).
//!
//! | Strategy                          | State                              | Pick                                   |
//! |-----------------------------------|------------------------------------|----------------------------------------|
//! | [`RandomStrategy`]                | last index                         | uniform                                |
//! | [`RoundRobinStrategy`]            | cursor                             | next in order, wrapping                |
//! | [`StickyStrategy`]                | bucket → handler map               | cached per key, round-robin on miss    |
//! | [`WeightedRoundRobinStrategy`]    | distribution table + counter       | in order, repeated by weight           |
//! | [`WeightedRandomStrategy`]        | distribution table + remaining sum | random, without replacement per round  |

mod random;
mod round_robin;
mod sticky;
mod strategy;
mod weighted;
mod weighted_random;
mod weighted_round_robin;

pub use random::RandomStrategy;
pub use round_robin::RoundRobinStrategy;
pub use sticky::StickyStrategy;
pub use strategy::SelectionStrategy;
pub use weighted::{DistributionEntry, DistributionTable};
pub use weighted_random::WeightedRandomStrategy;
pub use weighted_round_robin::WeightedRoundRobinStrategy;
