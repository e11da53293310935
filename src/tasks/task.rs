//! # Task: the unit of work routed by dispatchers.
//!
//! A [`Task`] bundles:
//! - an opaque, immutable **payload** (`Arc<dyn Any + Send + Sync>`),
//! - an **error slot** (`None` or a shared error value),
//! - a string-keyed **property bag** used for bookkeeping (redelivery counters etc.).
//!
//! Ownership of a task moves into a handler and comes back through the
//! [`Continuation`](crate::Continuation), so exactly one component holds it at any time.
//!
//! ## Copies
//! [`Task::copy`] produces an independent property bag and error slot, while the
//! payload is shared (it is immutable; handlers replace it with [`Task::set_payload`]).
//!
//! ## Example
//! ```rust
//! use taskmux::{Task, Value};
//!
//! let mut task = Task::new("order-42").with_property("customer", "acme");
//! let copy = task.copy();
//! task.set_property("customer", Value::from("other"));
//!
//! assert_eq!(copy.property("customer"), Some(&Value::from("acme")));
//! assert_eq!(task.payload_ref::<&str>(), Some(&"order-42"));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ErrorKind;

/// Global id counter for tasks and their copies.
static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Shared error stored in a task's error slot.
pub type TaskErrorRef = Arc<dyn StdError + Send + Sync + 'static>;

/// Opaque task payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Error handler marked the failure as handled.
pub const HANDLED: &str = "handled";
/// Failure was handled by a dead-letter style handler.
pub const FAILURE_HANDLED: &str = "failure_handled";
/// Task is being redelivered.
pub const REDELIVERED: &str = "redelivered";
/// Number of redeliveries so far.
pub const REDELIVERY_COUNTER: &str = "redelivery_counter";
/// Upper bound of redeliveries configured by an upstream error handler.
pub const REDELIVERY_MAX_COUNTER: &str = "redelivery_max_counter";
/// Description of an error that was caught and swallowed upstream.
pub const EXCEPTION_CAUGHT: &str = "exception_caught";
/// Name of the handler that produced the failure.
pub const FAILURE_HANDLER: &str = "failure_handler";

/// Properties that describe the outcome of a previous attempt.
///
/// [`Task::reset_for_retry`] removes all of them.
pub const RETRY_PROPERTIES: [&str; 7] = [
    HANDLED,
    FAILURE_HANDLED,
    REDELIVERED,
    REDELIVERY_COUNTER,
    REDELIVERY_MAX_COUNTER,
    EXCEPTION_CAUGHT,
    FAILURE_HANDLER,
];

/// Value stored in a task's property bag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(Arc<str>),
}

impl Value {
    /// Returns the boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text, if this is a `Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(&**s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v.into())
    }
}

/// Mutable unit of work flowing through dispatchers and handlers.
pub struct Task {
    id: u64,
    payload: Payload,
    error: Option<TaskErrorRef>,
    properties: HashMap<String, Value>,
}

impl Task {
    /// Creates a task owning the given payload.
    pub fn new<P: Any + Send + Sync>(payload: P) -> Self {
        Self::from_payload(Arc::new(payload))
    }

    /// Creates a task from an already shared payload.
    pub fn from_payload(payload: Payload) -> Self {
        Self {
            id: TASK_SEQ.fetch_add(1, Ordering::Relaxed),
            payload,
            error: None,
            properties: HashMap::new(),
        }
    }

    /// Unique id of this task (copies get a new one).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the raw payload handle.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the payload downcast to `T`, if it has that type.
    pub fn payload_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Replaces the payload.
    pub fn set_payload<P: Any + Send + Sync>(&mut self, payload: P) {
        self.payload = Arc::new(payload);
    }

    /// Returns the current error, if any.
    pub fn error(&self) -> Option<&TaskErrorRef> {
        self.error.as_ref()
    }

    /// Returns `true` when the error slot is occupied.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Stores an error, replacing the previous one.
    pub fn set_error<E: StdError + Send + Sync + 'static>(&mut self, err: E) {
        self.error = Some(Arc::new(err));
    }

    /// Stores an already shared error.
    pub fn set_error_ref(&mut self, err: TaskErrorRef) {
        self.error = Some(err);
    }

    /// Clears the error slot and returns the previous error.
    pub fn take_error(&mut self) -> Option<TaskErrorRef> {
        self.error.take()
    }

    /// Returns `true` if the error (or any error in its cause chain) is of `kind`.
    pub fn has_error_of_kind(&self, kind: &ErrorKind) -> bool {
        match &self.error {
            Some(err) => kind.matches_chain(err.as_ref()),
            None => false,
        }
    }

    /// Returns the error downcast to `E`, searching the cause chain.
    pub fn error_as<E: StdError + 'static>(&self) -> Option<&E> {
        let mut current: Option<&(dyn StdError + 'static)> =
            self.error.as_deref().map(|e| e as &(dyn StdError + 'static));
        while let Some(e) = current {
            if let Some(found) = e.downcast_ref::<E>() {
                return Some(found);
            }
            current = e.source();
        }
        None
    }

    /// Reads a property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Sets a property, returning the previous value.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.insert(key.into(), value)
    }

    /// Removes a property, returning its value.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Iterates over all properties (unordered).
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Produces an independent duplicate.
    ///
    /// The property bag and error slot are cloned; the immutable payload is shared.
    pub fn copy(&self) -> Self {
        Self {
            id: TASK_SEQ.fetch_add(1, Ordering::Relaxed),
            payload: Arc::clone(&self.payload),
            error: self.error.clone(),
            properties: self.properties.clone(),
        }
    }

    /// Clears the error and all outcome bookkeeping of a previous attempt.
    pub fn reset_for_retry(&mut self) {
        self.error = None;
        for key in RETRY_PROPERTIES {
            self.properties.remove(key);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}
