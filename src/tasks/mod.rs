//! # Task data model and completion callback.
//!
//! This module provides:
//! - [`Task`] - mutable unit of work (payload + error slot + property bag)
//! - [`Value`] - property bag values
//! - [`Continuation`] - one-shot completion callback returning the task to its caller
//! - well-known bookkeeping property keys ([`REDELIVERED`], [`REDELIVERY_COUNTER`], ...)

mod continuation;
mod task;

pub use continuation::Continuation;
pub use task::{
    Payload, Task, TaskErrorRef, Value, EXCEPTION_CAUGHT, FAILURE_HANDLED, FAILURE_HANDLER,
    HANDLED, REDELIVERED, REDELIVERY_COUNTER, REDELIVERY_MAX_COUNTER, RETRY_PROPERTIES,
};
