//! Chat event dispatch module.
//!
//! Consumes events from the chat connection and routes them to the
//! command handler or to log output.

mod runner;

pub use runner::{DispatcherMessage, EventDispatcher};
