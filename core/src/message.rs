//! IRC message parsing and handling
//!
//! This module implements the client side of the IRC message format as
//! defined in RFC 1459, plus the IRCv3 commands the relay needs for SASL.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IRC message prefix (server or user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prefix {
    /// Server name, or a bare nickname without user/host parts
    Server(String),
    /// User prefix (nick!user@host)
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl Prefix {
    /// Parse a prefix without its leading ':'
    pub fn parse(input: &str) -> crate::Result<Self> {
        match input.split_once('!') {
            Some((nick, rest)) => {
                let (user, host) = rest
                    .split_once('@')
                    .ok_or_else(|| crate::Error::MessageParse("Invalid user prefix format".to_string()))?;
                Ok(Prefix::User {
                    nick: nick.to_string(),
                    user: user.to_string(),
                    host: host.to_string(),
                })
            }
            None => Ok(Prefix::Server(input.to_string())),
        }
    }

    /// Nickname of the sender (the whole name for server prefixes)
    pub fn nick(&self) -> &str {
        match self {
            Prefix::Server(name) => name,
            Prefix::User { nick, .. } => nick,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{}", name),
            Prefix::User { nick, user, host } => write!(f, "{}!{}@{}", nick, user, host),
        }
    }
}

/// IRC message types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    // Connection registration
    Password,
    Nick,
    User,
    Quit,

    // Channel operations
    Join,
    Part,
    Kick,
    Mode,

    // Messaging
    PrivMsg,
    Notice,

    // Miscellaneous
    Ping,
    Pong,
    Error,

    // IRCv3 extensions
    Cap,
    Authenticate,

    // Numerics and anything else
    Custom(String),
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Password => "PASS",
            MessageType::Nick => "NICK",
            MessageType::User => "USER",
            MessageType::Quit => "QUIT",
            MessageType::Join => "JOIN",
            MessageType::Part => "PART",
            MessageType::Kick => "KICK",
            MessageType::Mode => "MODE",
            MessageType::PrivMsg => "PRIVMSG",
            MessageType::Notice => "NOTICE",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Error => "ERROR",
            MessageType::Cap => "CAP",
            MessageType::Authenticate => "AUTHENTICATE",
            MessageType::Custom(cmd) => cmd,
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PASS" => MessageType::Password,
            "NICK" => MessageType::Nick,
            "USER" => MessageType::User,
            "QUIT" => MessageType::Quit,
            "JOIN" => MessageType::Join,
            "PART" => MessageType::Part,
            "KICK" => MessageType::Kick,
            "MODE" => MessageType::Mode,
            "PRIVMSG" => MessageType::PrivMsg,
            "NOTICE" => MessageType::Notice,
            "PING" => MessageType::Ping,
            "PONG" => MessageType::Pong,
            "ERROR" => MessageType::Error,
            "CAP" => MessageType::Cap,
            "AUTHENTICATE" => MessageType::Authenticate,
            _ => MessageType::Custom(s.to_string()),
        }
    }
}

/// IRC message as defined in RFC 1459
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Optional prefix (server or user)
    pub prefix: Option<Prefix>,
    /// Message command/type
    pub command: MessageType,
    /// Message parameters
    pub params: Vec<String>,
}

impl Message {
    /// Create a new message
    pub fn new(command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command,
            params,
        }
    }

    /// Create a new message with prefix
    pub fn with_prefix(prefix: Prefix, command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: Some(prefix),
            command,
            params,
        }
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new(MessageType::PrivMsg, vec![target.to_string(), text.to_string()])
    }

    pub fn join(channel: &str) -> Self {
        Self::new(MessageType::Join, vec![channel.to_string()])
    }

    pub fn nick(nickname: &str) -> Self {
        Self::new(MessageType::Nick, vec![nickname.to_string()])
    }

    pub fn mode(channel: &str, mode: &str, target: &str) -> Self {
        Self::new(
            MessageType::Mode,
            vec![channel.to_string(), mode.to_string(), target.to_string()],
        )
    }

    /// Parse an IRC message from a string
    ///
    /// IRCv3 message tags are accepted and discarded.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let mut rest = input.trim_end_matches(['\r', '\n']).trim_start();
        if rest.is_empty() {
            return Err(crate::Error::MessageParse("Empty message".to_string()));
        }

        if rest.starts_with('@') {
            rest = rest
                .split_once(' ')
                .map(|(_, r)| r.trim_start())
                .unwrap_or_default();
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix_str, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = remainder.trim_start();
            Some(Prefix::parse(prefix_str)?)
        } else {
            None
        };

        // Trailing parameter can contain spaces
        let (middle, trailing) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 2..])),
            None => (rest, None),
        };

        let mut parts = middle.split_whitespace();
        let command_str = parts
            .next()
            .ok_or_else(|| crate::Error::MessageParse("No command found".to_string()))?;

        let mut params: Vec<String> = parts.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Message {
            prefix,
            command: MessageType::from(command_str),
            params,
        })
    }

    /// Numeric reply code, if this is a numeric
    pub fn numeric(&self) -> Option<u16> {
        match &self.command {
            MessageType::Custom(cmd) if cmd.len() == 3 => cmd.parse().ok(),
            _ => None,
        }
    }

    /// Nickname of the sender, if the message has a prefix
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().map(Prefix::nick)
    }

    /// Serialize message to a wire line, including the trailing CRLF
    pub fn to_line(&self) -> String {
        let mut result = String::new();

        if let Some(ref prefix) = self.prefix {
            result.push(':');
            result.push_str(&prefix.to_string());
            result.push(' ');
        }

        result.push_str(&self.command.to_string());

        for (i, param) in self.params.iter().enumerate() {
            result.push(' ');
            let last = i == self.params.len() - 1;
            if last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                result.push(':');
            }
            result.push_str(param);
        }

        result.push_str("\r\n");
        result
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_message() {
        let msg = Message::parse("NICK alice").unwrap();
        assert_eq!(msg.command, MessageType::Nick);
        assert_eq!(msg.params, vec!["alice"]);
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn test_parse_message_with_prefix() {
        let msg = Message::parse(":alice!user@host PRIVMSG #channel :Hello world").unwrap();
        match msg.prefix {
            Some(Prefix::User { ref nick, ref user, ref host }) => {
                assert_eq!(nick, "alice");
                assert_eq!(user, "user");
                assert_eq!(host, "host");
            }
            _ => panic!("Expected user prefix"),
        }
        assert_eq!(msg.command, MessageType::PrivMsg);
        assert_eq!(msg.params, vec!["#channel", "Hello world"]);
    }

    #[test]
    fn test_parse_trailing_keeps_inner_colons_and_spacing() {
        let msg = Message::parse(":a!b@c PRIVMSG #rust :see  http://x :)\r\n").unwrap();
        assert_eq!(msg.params, vec!["#rust", "see  http://x :)"]);
    }

    #[test]
    fn test_parse_numeric_and_tags() {
        let msg = Message::parse("@time=2024-01-01T00:00:00Z :irc.example.net 001 relay :Welcome").unwrap();
        assert_eq!(msg.numeric(), Some(1));
        assert_eq!(msg.source_nick(), Some("irc.example.net"));
        assert_eq!(msg.params, vec!["relay", "Welcome"]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Message::parse("   \r\n").is_err());
        assert!(Message::parse(":only.prefix").is_err());
    }

    #[test]
    fn test_serialize_message() {
        let msg = Message::new(MessageType::Nick, vec!["alice".to_string()]);
        assert_eq!(msg.to_line(), "NICK alice\r\n");
        assert_eq!(Message::privmsg("#c", "hi there").to_string(), "PRIVMSG #c :hi there");
        assert_eq!(Message::privmsg("#c", ":)").to_string(), "PRIVMSG #c ::)");
        assert_eq!(Message::mode("#chan", "+b", "n!u@h").to_string(), "MODE #chan +b n!u@h");
    }
}
