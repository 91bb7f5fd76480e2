//! Twitch user authentication.
//!
//! Obtains a user access token with a fixed scope set, validates and
//! refreshes it, and keeps it on disk between runs.

mod authenticator;
mod token;

pub use authenticator::{AuthError, Authenticator, TokenInfo, UserSession};
pub use token::{StoredToken, TokenStore};

use std::fmt;

/// OAuth scopes the bot can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScope {
    ChatRead,
    ChatEdit,
    WhispersRead,
    ChannelReadRedemptions,
}

impl AuthScope {
    /// Returns the scope name as Twitch expects it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChatRead => "chat:read",
            Self::ChatEdit => "chat:edit",
            Self::WhispersRead => "whispers:read",
            Self::ChannelReadRedemptions => "channel:read:redemptions",
        }
    }
}

impl fmt::Display for AuthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scopes requested for the bot's user token.
pub const USER_SCOPES: [AuthScope; 4] = [
    AuthScope::ChatRead,
    AuthScope::ChatEdit,
    AuthScope::WhispersRead,
    AuthScope::ChannelReadRedemptions,
];
