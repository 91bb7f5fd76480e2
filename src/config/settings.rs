//! Application settings and Twitch configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Twitch application credentials and token storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    /// Application client ID (obtain from <https://dev.twitch.tv/console>).
    pub app_id: String,

    /// Application client secret.
    pub app_secret: String,

    /// Redirect URI registered for the application.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Path to the stored user token.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
}

fn default_redirect_uri() -> String {
    "http://localhost:17563".to_owned()
}

fn default_token_path() -> PathBuf {
    PathBuf::from("user_token.json")
}

impl TwitchConfig {
    /// Creates a new Twitch configuration.
    #[must_use]
    pub fn new(app_id: String, app_secret: String) -> Self {
        Self {
            app_id,
            app_secret,
            redirect_uri: default_redirect_uri(),
            token_path: default_token_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TWITCH_APP_ID` and `TWITCH_APP_SECRET` to be set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if a required variable is
    /// unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_id = require_env("TWITCH_APP_ID")?;
        let app_secret = require_env("TWITCH_APP_SECRET")?;

        let redirect_uri =
            std::env::var("TWITCH_REDIRECT_URI").unwrap_or_else(|_| default_redirect_uri());

        let token_path = std::env::var("TWITCH_TOKEN_PATH")
            .map_or_else(|_| default_token_path(), PathBuf::from);

        Ok(Self {
            app_id,
            app_secret,
            redirect_uri,
            token_path,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(name)),
    }
}

/// Bot-specific settings.
///
/// Built once at startup and shared read-only with every handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Channel the bot joins once the chat connection is ready.
    #[serde(default = "default_target_channel")]
    pub target_channel: String,

    /// Logins permitted to use privileged commands.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Command prefix for chat commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Path to the cowsay executable.
    #[serde(default = "default_cowsay_path")]
    pub cowsay_path: PathBuf,

    /// Upper bound for a single cowsay run in seconds.
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
}

fn default_target_channel() -> String {
    "syntax976".to_owned()
}

fn default_allowed_users() -> Vec<String> {
    vec!["billweiss".to_owned(), "beardbyte".to_owned()]
}

fn default_command_prefix() -> String {
    "!".to_owned()
}

fn default_cowsay_path() -> PathBuf {
    PathBuf::from("/usr/games/cowsay")
}

fn default_render_timeout() -> u64 {
    10
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            target_channel: default_target_channel(),
            allowed_users: default_allowed_users(),
            command_prefix: default_command_prefix(),
            cowsay_path: default_cowsay_path(),
            render_timeout_secs: default_render_timeout(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            target_channel: std::env::var("TARGET_CHANNEL")
                .map_or_else(|_| default_target_channel(), |c| normalize_channel(&c)),
            allowed_users: std::env::var("ALLOWED_USERS")
                .map_or_else(|_| default_allowed_users(), |s| parse_user_list(&s)),
            command_prefix: std::env::var("COMMAND_PREFIX")
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(default_command_prefix),
            cowsay_path: std::env::var("COWSAY_PATH")
                .map_or_else(|_| default_cowsay_path(), PathBuf::from),
            render_timeout_secs: std::env::var("RENDER_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&secs| secs > 0)
                .unwrap_or_else(default_render_timeout),
        }
    }

    /// Checks whether a login is on the allow-list.
    #[must_use]
    pub fn is_allowed(&self, login: &str) -> bool {
        self.allowed_users.iter().any(|user| user == login)
    }

    /// Returns the render timeout as a [`Duration`].
    #[must_use]
    pub const fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

/// Lowercases a channel name and strips a leading `#`.
#[must_use]
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

/// Parses a comma separated list of logins.
fn parse_user_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|user| user.trim().to_lowercase())
        .filter(|user| !user.is_empty())
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.target_channel, "syntax976");
        assert_eq!(settings.command_prefix, "!");
        assert_eq!(settings.render_timeout(), Duration::from_secs(10));
        assert_eq!(settings.cowsay_path, PathBuf::from("/usr/games/cowsay"));
    }

    #[test]
    fn test_allow_list() {
        let settings = BotSettings::default();
        assert!(settings.is_allowed("billweiss"));
        assert!(settings.is_allowed("beardbyte"));
        assert!(!settings.is_allowed("eve"));
        assert!(!settings.is_allowed("BillWeiss"));
    }

    #[test]
    fn test_parse_user_list() {
        assert_eq!(
            parse_user_list(" Alice, bob,,carol "),
            vec!["alice", "bob", "carol"]
        );
        assert!(parse_user_list("").is_empty());
    }

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("#Syntax976"), "syntax976");
        assert_eq!(normalize_channel("  somechannel "), "somechannel");
    }

    #[test]
    fn test_twitch_config_new() {
        let config = TwitchConfig::new("app".to_owned(), "secret".to_owned());
        assert_eq!(config.app_id, "app");
        assert_eq!(config.app_secret, "secret");
        assert_eq!(config.redirect_uri, "http://localhost:17563");
        assert_eq!(config.token_path, PathBuf::from("user_token.json"));
    }
}
