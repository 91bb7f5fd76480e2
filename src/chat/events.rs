//! Typed chat events produced by the connection.

use std::fmt;

use super::message::IrcMessage;

/// `USERNOTICE` kinds reported as subscriptions.
const SUB_NOTICE_IDS: [&str; 4] = ["sub", "resub", "subgift", "submysterygift"];

/// A chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Channel name without the leading `#`.
    pub name: String,
}

impl Room {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The user behind a chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    /// Lowercase login name; what the allow-list matches against.
    pub name: String,

    /// Name as displayed in chat.
    pub display_name: String,
}

impl ChatUser {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
        }
    }
}

impl fmt::Display for ChatUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A message posted in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message ID, used to thread replies.
    pub id: Option<String>,
    pub room: Room,
    pub user: ChatUser,
    pub text: String,
}

/// A subscription announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSub {
    pub room: Room,

    /// Notice kind (`sub`, `resub`, `subgift`, `submysterygift`).
    pub sub_type: String,

    /// Plan identifier (`Prime`, `1000`, `2000`, `3000`).
    pub sub_plan: String,

    /// Human readable plan name.
    pub sub_plan_name: String,

    /// Announcement text generated by Twitch.
    pub system_message: String,

    /// Message the subscriber attached, empty if none.
    pub sub_message: String,
}

/// Events delivered to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Login finished; channels can be joined.
    Ready,

    /// The bot joined a channel.
    Joined(Room),

    /// Someone posted a message.
    Message(ChatMessage),

    /// Someone subscribed.
    Subscription(ChatSub),
}

impl ChatEvent {
    /// Translates an IRC line into an event, if it maps to one.
    ///
    /// `own_login` identifies the bot's own `JOIN` echoes.
    #[must_use]
    pub fn from_irc(message: &IrcMessage, own_login: &str) -> Option<Self> {
        match message.command.as_str() {
            "376" => Some(Self::Ready),
            "JOIN" => {
                let nick = message.nick()?;
                if !nick.eq_ignore_ascii_case(own_login) {
                    return None;
                }
                Some(Self::Joined(Room::new(message.channel()?)))
            }
            "PRIVMSG" => {
                let login = message.nick()?.to_lowercase();
                let display_name = message
                    .tag("display-name")
                    .map_or_else(|| login.clone(), ToOwned::to_owned);

                Some(Self::Message(ChatMessage {
                    id: message.tag("id").map(ToOwned::to_owned),
                    room: Room::new(message.channel()?),
                    user: ChatUser {
                        name: login,
                        display_name,
                    },
                    text: message.trailing()?.to_owned(),
                }))
            }
            "USERNOTICE" => {
                let kind = message.tag("msg-id")?;
                if !SUB_NOTICE_IDS.contains(&kind) {
                    return None;
                }

                Some(Self::Subscription(ChatSub {
                    room: Room::new(message.channel()?),
                    sub_type: kind.to_owned(),
                    sub_plan: message.tag("msg-param-sub-plan").unwrap_or_default().to_owned(),
                    sub_plan_name: message
                        .tag("msg-param-sub-plan-name")
                        .unwrap_or_default()
                        .to_owned(),
                    system_message: message.tag("system-msg").unwrap_or_default().to_owned(),
                    sub_message: message.trailing().unwrap_or_default().to_owned(),
                }))
            }
            _ => None,
        }
    }
}
