//! Twitch chat connection module.
//!
//! Provides the IRC-over-WebSocket client, the typed events it emits and
//! the [`ChatSender`] interface handlers use to talk back to chat.

mod client;
mod events;
mod message;

use async_trait::async_trait;
use thiserror::Error;

pub use client::TwitchChat;
pub use events::{ChatEvent, ChatMessage, ChatSub, ChatUser, Room};
pub use message::{IrcMessage, MAX_MESSAGE_CHARS, sanitize_text};

/// Errors that can occur on the chat connection.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Chat connection is closed")]
    Closed,

    #[error("Chat login rejected: {0}")]
    LoginRejected(String),

    #[error("No answer to the chat login after {0:?}")]
    LoginTimedOut(std::time::Duration),
}

/// Outbound side of a chat connection.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Requests to join a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Closed`] if the connection is gone.
    async fn join_room(&self, channel: &str) -> Result<(), ChatError>;

    /// Sends a message to a channel, threaded under `reply_to` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Closed`] if the connection is gone.
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChatError>;
}
