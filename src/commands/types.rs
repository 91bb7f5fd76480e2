//! Command types and definitions.

use std::collections::HashMap;
use std::fmt;

use crate::chat::{ChatMessage, ChatUser, Room};

/// Handlers a command name can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Echo the parameter back to the caller.
    Reply,

    /// Render the parameter with cowsay. Allow-listed users only.
    Cowsay,
}

impl CommandKind {
    /// Checks if the command is restricted to the allow-list.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Cowsay)
    }

    /// Returns the command description for logs and help output.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Reply => "Reply with the given text",
            Self::Cowsay => "Render the given text with cowsay (allow-list only)",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reply => f.write_str("reply"),
            Self::Cowsay => f.write_str("cowsay"),
        }
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name as typed, without the prefix.
    pub name: String,

    /// Who sent the command.
    pub user: ChatUser,

    /// Everything after the first space; empty if there is none.
    pub parameter: String,

    /// Channel the command was sent in.
    pub room: Room,

    /// ID of the triggering message, used to thread the reply.
    pub message_id: Option<String>,
}

impl CommandInvocation {
    /// Parses a command from a chat message.
    ///
    /// Returns `None` if the message does not start with `prefix` or has
    /// no command name.
    #[must_use]
    pub fn parse(message: &ChatMessage, prefix: &str) -> Option<Self> {
        let after_prefix = message.text.strip_prefix(prefix)?;

        let (name, parameter) = match after_prefix.split_once(' ') {
            Some((name, parameter)) => (name, parameter),
            None => (after_prefix, ""),
        };

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_owned(),
            user: message.user.clone(),
            parameter: parameter.to_owned(),
            room: message.room.clone(),
            message_id: message.id.clone(),
        })
    }
}

/// Mapping from command name to handler.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandKind>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bot's two commands: `reply` and `asdf`.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .register("reply", CommandKind::Reply)
            .register("asdf", CommandKind::Cowsay)
    }

    /// Adds a command, replacing any handler registered under the same name.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, kind: CommandKind) -> Self {
        self.commands.insert(name.into(), kind);
        self
    }

    /// Looks up a command by exact name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<CommandKind> {
        self.commands.get(name).copied()
    }

    /// Returns registered names with their handlers, sorted by name.
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, CommandKind)> {
        let mut entries: Vec<_> = self
            .commands
            .iter()
            .map(|(name, kind)| (name.as_str(), *kind))
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command did what was asked.
    pub success: bool,

    /// Reply to post in chat; `None` means stay silent.
    pub reply: Option<String>,
}

impl CommandResult {
    /// Creates a successful result with a reply.
    #[must_use]
    pub fn success(reply: impl Into<String>) -> Self {
        Self {
            success: true,
            reply: Some(reply.into()),
        }
    }

    /// Creates a failed result that still answers the caller.
    #[must_use]
    pub fn error(reply: impl Into<String>) -> Self {
        Self {
            success: false,
            reply: Some(reply.into()),
        }
    }

    /// Creates a failed result that sends nothing.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            success: false,
            reply: None,
        }
    }
}
