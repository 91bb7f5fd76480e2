//! IRC line parsing and formatting for Twitch chat.

use std::collections::HashMap;

/// Twitch drops chat messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// A single parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcMessage {
    /// IRCv3 message tags, values unescaped.
    pub tags: HashMap<String, String>,

    /// Message source (`nick!user@host` or a server name).
    pub prefix: Option<String>,

    /// Command or numeric reply.
    pub command: String,

    /// Parameters; a trailing parameter is the last element.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parses one IRC line (without the line terminator).
    ///
    /// Returns `None` for empty lines or lines without a command.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut message = Self::default();

        if let Some(tagged) = rest.strip_prefix('@') {
            let (tags, after) = tagged.split_once(' ')?;
            message.tags = parse_tags(tags);
            rest = after.trim_start_matches(' ');
        }

        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, after) = prefixed.split_once(' ')?;
            message.prefix = Some(prefix.to_owned());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut params) = match rest.split_once(' ') {
            Some((command, params)) => (command, params),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }
        message.command = command.to_owned();

        loop {
            params = params.trim_start_matches(' ');
            if params.is_empty() {
                break;
            }
            if let Some(trailing) = params.strip_prefix(':') {
                message.params.push(trailing.to_owned());
                break;
            }
            match params.split_once(' ') {
                Some((param, after)) => {
                    message.params.push(param.to_owned());
                    params = after;
                }
                None => {
                    message.params.push(params.to_owned());
                    break;
                }
            }
        }

        Some(message)
    }

    /// Returns a tag value, `None` if missing or empty.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Returns the nickname part of the prefix.
    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split_once('!').map(|(nick, _)| nick)
    }

    /// Returns the channel a message targets, without the leading `#`.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.params
            .first()
            .and_then(|target| target.strip_prefix('#'))
    }

    /// Returns the trailing parameter (the message text for PRIVMSG).
    #[must_use]
    pub fn trailing(&self) -> Option<&str> {
        // Channel-targeted commands carry text only after the channel.
        if self.params.len() < 2 {
            return None;
        }
        self.params.last().map(String::as_str)
    }
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_owned(), unescape_tag_value(value)),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}

/// Reverses IRCv3 tag value escaping.
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

/// Formats a chat message, optionally as a threaded reply.
#[must_use]
pub fn privmsg(channel: &str, text: &str, reply_to: Option<&str>) -> String {
    let text = sanitize_text(text);
    match reply_to {
        Some(parent) if is_safe_tag_value(parent) => {
            format!("@reply-parent-msg-id={parent} PRIVMSG #{channel} :{text}")
        }
        _ => format!("PRIVMSG #{channel} :{text}"),
    }
}

/// Formats a channel join request.
#[must_use]
pub fn join(channel: &str) -> String {
    format!("JOIN #{channel}")
}

/// Flattens text to one line and cuts it to the chat limit.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|ch| if ch == '\r' || ch == '\n' { ' ' } else { ch })
        .take(MAX_MESSAGE_CHARS)
        .collect()
}

fn is_safe_tag_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| !ch.is_whitespace() && ch != ';' && !ch.is_control())
}
