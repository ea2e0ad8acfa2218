use chrono::{DateTime, Utc};
use std::{fmt, ops::Deref};
use thiserror::Error;

use crate::Tags;

/// Reasons a received line could not be turned into a [`Message`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("no command in line")]
    MissingCommand,
    #[error("{0:?} can't be sent as a middle parameter")]
    InvalidParam(String),
}

/// The source of a message: `name!user@host`, with user and host optional
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    pub fn parse(raw: &str) -> Self {
        let (rest, host) = match raw.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (raw, None),
        };
        let (name, user) = match rest.split_once('!') {
            Some((name, user)) => (name, Some(user.to_string())),
            None => (rest, None),
        };

        Self {
            name: name.to_string(),
            user,
            host,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(user) = &self.user {
            write!(f, "!{}", user)?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}

/// A single parsed protocol line, without vendor tags.
///
/// The recipient and sender are derived from the prefix and parameters
/// (see [`to`](Self::to) and [`from`](Self::from)) rather than stored, so they
/// can never disagree with the wire content.
#[derive(Debug, Clone)]
pub struct Message {
    prefix: Option<Prefix>,
    command: String,
    params: Vec<String>,
    trailing: Option<String>,
    received_at: DateTime<Utc>,
}

/// Split the `@tags` segment, if any, from the rest of a line
fn split_tags(raw: &str) -> Result<(Option<&str>, &str), ParseError> {
    let raw = raw.trim_end_matches(&['\r', '\n'][..]).trim_start();
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }

    match raw.strip_prefix('@') {
        Some(tagged) => match tagged.split_once(' ') {
            Some((tags, rest)) => Ok((Some(tags), rest)),
            // A string of tags with no command
            None => Err(ParseError::MissingCommand),
        },
        None => Ok((None, raw)),
    }
}

impl Message {
    /// Build an outbound message. The timestamp is the time of construction.
    ///
    /// Middle parameters must be single words: a parameter that is empty,
    /// contains a space or starts with `:` is refused, since it could only be
    /// sent as the trailing parameter.
    pub fn new(
        command: impl Into<String>,
        params: Vec<String>,
        trailing: Option<String>,
    ) -> Result<Self, ParseError> {
        let command = command.into();
        if command.is_empty() || command.contains(' ') {
            return Err(ParseError::MissingCommand);
        }
        if let Some(bad) = params
            .iter()
            .find(|p| p.is_empty() || p.contains(' ') || p.starts_with(':'))
        {
            return Err(ParseError::InvalidParam(bad.clone()));
        }

        Ok(Self {
            prefix: None,
            command,
            params,
            trailing,
            received_at: Utc::now(),
        })
    }

    /// Parse a line as received from the server. Any tag segment is
    /// accepted and discarded; use [`ExtendedMessage::parse`] to keep it.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let (_, rest) = split_tags(raw)?;
        Self::parse_untagged(rest)
    }

    fn parse_untagged(raw: &str) -> Result<Self, ParseError> {
        let mut rest = raw.trim_start();

        let prefix = match rest.strip_prefix(':') {
            Some(prefixed) => {
                let (prefix, after) = prefixed
                    .split_once(' ')
                    .ok_or(ParseError::MissingCommand)?;
                rest = after.trim_start();
                Some(Prefix::parse(prefix))
            }
            None => None,
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        let mut trailing = None;

        loop {
            rest = rest.trim_start_matches(' ');
            if let Some(text) = rest.strip_prefix(':') {
                trailing = Some(text.to_string());
                break;
            }

            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    if !rest.is_empty() {
                        params.push(rest.to_string());
                    }
                    break;
                }
            }
        }

        Ok(Self {
            prefix,
            command: command.to_string(),
            params,
            trailing,
            received_at: Utc::now(),
        })
    }

    pub fn prefix(&self) -> Option<&Prefix> {
        self.prefix.as_ref()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Case-insensitive comparison against the command
    pub fn is(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }

    /// The middle parameters, in order
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn trailing(&self) -> Option<&str> {
        self.trailing.as_deref()
    }

    /// The trailing text, or an empty string if there is none
    pub fn content(&self) -> &str {
        self.trailing().unwrap_or_default()
    }

    /// The trailing parameter if present, otherwise the last middle parameter
    pub fn last_param(&self) -> Option<&str> {
        self.trailing()
            .or_else(|| self.params.last().map(String::as_str))
    }

    /// Who the message is addressed to.
    ///
    /// This is the first middle parameter. For `JOIN` with no middle
    /// parameters the channel is taken from the trailing text instead.
    pub fn to(&self) -> &str {
        match self.params.first() {
            Some(target) => target,
            None if self.is("JOIN") => self.content(),
            None => "",
        }
    }

    /// The nick or server name that sent the message, or empty if there
    /// was no prefix
    pub fn from(&self) -> &str {
        self.prefix.as_ref().map(|p| p.name.as_str()).unwrap_or_default()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

// Equality is wire equality; two parses of the same line are equal even
// though they were received at different times.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && self.command == other.command
            && self.params == other.params
            && self.trailing == other.trailing
    }
}

impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{}", trailing)?;
        }
        Ok(())
    }
}

/// A [`Message`] together with the vendor tags that arrived with it.
///
/// This is what triggers and subscribers receive. It dereferences to the
/// underlying message, so all of its accessors are available directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedMessage {
    message: Message,
    tags: Tags,
}

impl ExtendedMessage {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let (tags, rest) = split_tags(raw)?;
        let message = Message::parse_untagged(rest)?;
        let tags = tags.map(Tags::parse).unwrap_or_default();

        Ok(Self { message, tags })
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

impl Deref for ExtendedMessage {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl From<Message> for ExtendedMessage {
    fn from(message: Message) -> Self {
        Self {
            message,
            tags: Tags::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn privmsg_from_user() {
        let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello world").unwrap();

        assert_eq!(msg.from(), "nick");
        assert_eq!(msg.to(), "#chan");
        assert_eq!(msg.command(), "PRIVMSG");
        assert_eq!(msg.params(), &["#chan"]);
        assert_eq!(msg.trailing(), Some("hello world"));
        assert_eq!(
            msg.prefix(),
            Some(&Prefix {
                name: "nick".to_string(),
                user: Some("user".to_string()),
                host: Some("host".to_string()),
            })
        );
    }

    #[test]
    fn no_prefix() {
        let msg = Message::parse("PING :tmi.twitch.tv").unwrap();

        assert_eq!(msg.prefix(), None);
        assert_eq!(msg.from(), "");
        assert_eq!(msg.to(), "");
        assert_eq!(msg.last_param(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn ping_token_as_middle_param() {
        let msg = Message::parse("PING tmi.twitch.tv").unwrap();

        assert_eq!(msg.trailing(), None);
        assert_eq!(msg.last_param(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn server_prefix() {
        let msg = Message::parse(":tmi.twitch.tv 001 cybot :Welcome, GLHF!").unwrap();

        assert_eq!(msg.from(), "tmi.twitch.tv");
        assert_eq!(msg.prefix().unwrap().user, None);
        assert_eq!(msg.prefix().unwrap().host, None);
        assert_eq!(msg.command(), "001");
        assert_eq!(msg.to(), "cybot");
    }

    #[test]
    fn join_channel_in_trailing() {
        let msg = Message::parse(":nick!nick@nick.tmi.twitch.tv JOIN :#chan").unwrap();
        assert_eq!(msg.to(), "#chan");

        let msg = Message::parse(":nick!nick@nick.tmi.twitch.tv JOIN #chan").unwrap();
        assert_eq!(msg.to(), "#chan");
    }

    #[test]
    fn trailing_keeps_spaces_and_colons() {
        let msg = Message::parse("PRIVMSG #a :time is 12:30 : ok  ").unwrap();
        assert_eq!(msg.trailing(), Some("time is 12:30 : ok  "));
    }

    #[test]
    fn no_colon_means_no_trailing() {
        let msg = Message::parse("MODE #chan +o  someone").unwrap();

        assert_eq!(msg.params(), &["#chan", "+o", "someone"]);
        assert_eq!(msg.trailing(), None);
        assert_eq!(msg.content(), "");
    }

    #[test]
    fn empty_trailing() {
        let msg = Message::parse("PRIVMSG #a :").unwrap();
        assert_eq!(msg.trailing(), Some(""));
    }

    #[test]
    fn terminators_and_leading_space_ignored() {
        let msg = Message::parse("   PING :x\r\n").unwrap();
        assert_eq!(msg.command(), "PING");
        assert_eq!(msg.trailing(), Some("x"));
    }

    #[test]
    fn malformed_lines() {
        assert_eq!(Message::parse(""), Err(ParseError::Empty));
        assert_eq!(Message::parse("  \r\n"), Err(ParseError::Empty));
        assert_eq!(Message::parse("@a=b"), Err(ParseError::MissingCommand));
        assert_eq!(Message::parse(":prefix.only"), Err(ParseError::MissingCommand));
        assert_eq!(Message::parse(":prefix   "), Err(ParseError::MissingCommand));
        assert_eq!(Message::parse("@a=b :prefix"), Err(ParseError::MissingCommand));
    }

    #[test]
    fn tagged_frame() {
        let raw = "@badges=;color=#FF0000;display-name=Foo :foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :hi there";
        let msg = ExtendedMessage::parse(raw).unwrap();

        assert_eq!(msg.tags().get("color"), Some("#FF0000"));
        assert_eq!(msg.tags().get("display-name"), Some("Foo"));
        assert_eq!(msg.tags().get("badges"), Some(""));
        assert_eq!(msg.tags().len(), 3);

        let untagged = Message::parse(":foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :hi there").unwrap();
        assert_eq!(msg.message(), &untagged);
        assert_eq!(msg.from(), "foo");
        assert_eq!(msg.to(), "#bar");
    }

    #[test]
    fn untagged_frame_has_no_tags() {
        let msg = ExtendedMessage::parse("PING :x").unwrap();
        assert!(msg.tags().is_empty());
    }

    #[test]
    fn display_reparses_identically() {
        let lines = [
            ":nick!user@host PRIVMSG #chan :hello world",
            "PING tmi.twitch.tv",
            "PRIVMSG #a :",
            "PRIVMSG #a ::starts with a colon",
            ":tmi.twitch.tv CAP * ACK :twitch.tv/tags twitch.tv/commands",
            "MODE #chan +o someone",
        ];

        for line in lines {
            let msg = Message::parse(line).unwrap();
            let rendered = msg.to_string();
            let reparsed = Message::parse(&rendered).unwrap();

            assert_eq!(reparsed.command(), msg.command());
            assert_eq!(reparsed.params(), msg.params());
            assert_eq!(reparsed.trailing(), msg.trailing());
            assert_eq!(rendered, line);
        }
    }

    #[test]
    fn built_message_renders() {
        let msg = Message::new("PRIVMSG", vec!["#a".to_string()], Some("hi".to_string())).unwrap();
        assert_eq!(msg.to_string(), "PRIVMSG #a :hi");

        let msg = Message::new("PRIVMSG", vec!["#a".to_string()], Some(":-)".to_string())).unwrap();
        assert_eq!(Message::parse(&msg.to_string()).unwrap(), msg);
    }

    #[test]
    fn built_message_needs_single_word_params() {
        for bad in ["", "two words", ":colon"] {
            assert_eq!(
                Message::new("MODE", vec!["#a".to_string(), bad.to_string()], None),
                Err(ParseError::InvalidParam(bad.to_string()))
            );
        }
        assert_eq!(
            Message::new("", Vec::new(), None),
            Err(ParseError::MissingCommand)
        );
    }
}
