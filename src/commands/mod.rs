//! Command handling module.
//!
//! Parses prefixed chat messages into invocations, resolves them through
//! a fixed registry and runs the matching handler.

mod handler;
mod renderer;
mod types;

pub use handler::{CommandHandler, REPLY_REFUSAL};
pub use renderer::{ProcessRenderer, RenderError, TextRenderer};
pub use types::{CommandInvocation, CommandKind, CommandRegistry, CommandResult};

#[cfg(test)]
pub(crate) use handler::tests::RecordingRenderer;
