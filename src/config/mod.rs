//! Configuration module for the cowsay bot.
//!
//! Handles loading of Twitch application credentials and the bot
//! settings (target channel, allow-list, command prefix, renderer).

mod settings;

pub use settings::{BotSettings, ConfigError, TwitchConfig, normalize_channel};

/// Default Twitch chat endpoint (IRC over WebSocket).
pub const DEFAULT_CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
