//! The owned IRC message type and its wire parser.
//!
//! A message is `['@' tags ' '] [':' prefix ' '] command [params]`, with the
//! final parameter optionally `:`-prefixed so it may contain spaces.

use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

/// An owned IRC message.
///
/// # Example
///
/// ```
/// use slircb_proto::Message;
///
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
/// let reply = Message::privmsg("#channel", "Hi back");
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    /// IRCv3 message tags (e.g., `time`, `msgid`).
    pub tags: Option<Vec<Tag>>,
    /// Message prefix/source (e.g., `nick!user@host`).
    pub prefix: Option<Prefix>,
    /// The IRC command and its parameters.
    pub command: Command,
}

impl Message {
    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(|p| p.nick())
    }

    /// Create a PRIVMSG to a target with text.
    #[must_use]
    pub fn privmsg<T, M>(target: T, text: M) -> Self
    where
        T: Into<String>,
        M: Into<String>,
    {
        Command::PRIVMSG(target.into(), text.into()).into()
    }

    /// Create a NOTICE to a target with text.
    #[must_use]
    pub fn notice<T, M>(target: T, text: M) -> Self
    where
        T: Into<String>,
        M: Into<String>,
    {
        Command::NOTICE(target.into(), text.into()).into()
    }

    /// Create a NICK message.
    #[must_use]
    pub fn nick<N>(nickname: N) -> Self
    where
        N: Into<String>,
    {
        Command::NICK(nickname.into()).into()
    }

    /// Create a USER registration message.
    #[must_use]
    pub fn user<U, R>(username: U, realname: R) -> Self
    where
        U: Into<String>,
        R: Into<String>,
    {
        Command::USER(username.into(), "0".into(), realname.into()).into()
    }

    /// Create a PASS message.
    #[must_use]
    pub fn pass<P>(password: P) -> Self
    where
        P: Into<String>,
    {
        Command::PASS(password.into()).into()
    }

    /// Create a QUIT message with an optional reason.
    #[must_use]
    pub fn quit<M>(message: Option<M>) -> Self
    where
        M: Into<String>,
    {
        Command::QUIT(message.map(Into::into)).into()
    }

    /// Create a PONG answering the given PING token.
    #[must_use]
    pub fn pong<S>(token: S) -> Self
    where
        S: Into<String>,
    {
        Command::PONG(token.into(), None).into()
    }

    /// Set the prefix/source of this message.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

impl From<Command> for Message {
    fn from(cmd: Command) -> Message {
        Message {
            tags: None,
            prefix: None,
            command: cmd,
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let invalid = |cause: MessageParseError| ProtocolError::InvalidMessage {
            string: s.to_string(),
            cause,
        };

        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(invalid(MessageParseError::EmptyMessage));
        }

        let mut rest = line;

        let tags = match rest.strip_prefix('@') {
            Some(stripped) => {
                let (tag_str, remainder) = stripped
                    .split_once(' ')
                    .ok_or_else(|| invalid(MessageParseError::MissingCommand))?;
                rest = remainder;
                Some(parse_tags(tag_str))
            }
            None => None,
        };

        rest = rest.trim_start_matches(' ');
        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix_str, remainder) = stripped
                    .split_once(' ')
                    .ok_or_else(|| invalid(MessageParseError::MissingCommand))?;
                if prefix_str.is_empty() {
                    return Err(invalid(MessageParseError::InvalidPrefix(String::new())));
                }
                rest = remainder;
                Some(Prefix::new_from_str(prefix_str))
            }
            None => None,
        };

        let mut words = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                words.push(trailing);
                break;
            }
            match rest.split_once(' ') {
                Some((word, remainder)) => {
                    words.push(word);
                    rest = remainder;
                }
                None => {
                    words.push(rest);
                    break;
                }
            }
        }

        let (command, params) = words
            .split_first()
            .ok_or_else(|| invalid(MessageParseError::MissingCommand))?;

        Ok(Message {
            tags,
            prefix,
            command: Command::new(command, params.to_vec()),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref tags) = self.tags {
            write!(f, "@")?;
            for (i, tag) in tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                write!(f, "{}", tag.0)?;
                if let Some(ref value) = tag.1 {
                    write!(f, "=")?;
                    escape_tag_value(f, value)?;
                }
            }
            write!(f, " ")?;
        }

        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        write!(f, "{}\r\n", self.command)
    }
}

/// An IRCv3 message tag: key and optional value.
#[derive(Clone, PartialEq, Debug)]
pub struct Tag(pub String, pub Option<String>);

impl Tag {
    /// Create a new tag with a key and optional value.
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Tag(key.into(), value)
    }
}

fn parse_tags(tags_str: &str) -> Vec<Tag> {
    tags_str
        .split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| {
            let mut iter = tag.splitn(2, '=');
            let key = iter.next().unwrap_or("");
            let value = iter.next().map(unescape_tag_value);
            Tag(key.to_string(), value)
        })
        .collect()
}

fn escape_tag_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            ';' => write!(f, "\\:")?,
            ' ' => write!(f, "\\s")?,
            '\\' => write!(f, "\\\\")?,
            '\r' => write!(f, "\\r")?,
            '\n' => write!(f, "\\n")?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
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
