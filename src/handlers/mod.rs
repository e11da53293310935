//! # Handler contract and adapters.
//!
//! - [`Handler`] - the processing contract shared by handlers and dispatchers
//! - [`HandlerRef`] - shared handle (`Arc<dyn Handler>`), compared by identity
//! - [`HandlerExt`] - `call().await` / `call_blocking()` bridges over continuations
//! - [`HandlerFn`] - synchronous closure adapter
//! - [`SpawnHandler`] - async closure adapter running on the tokio runtime

mod handler;
mod handler_fn;
mod spawn;

pub use handler::{same_handler, Call, Handler, HandlerExt, HandlerRef};
pub use handler_fn::HandlerFn;
pub use spawn::SpawnHandler;
