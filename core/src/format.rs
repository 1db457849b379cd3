//! Formatting contract between the relay core and the bridge application
//!
//! The core never decides how a relayed line reads. It asks a
//! [`RelayFormatter`] to turn wire messages into fields for the other
//! platform and to turn outbound content into IRC text. [`PlainFormatter`]
//! is a minimal implementation used by the binary and the tests.

use crate::moderation::{ModeAction, ModeChange};
use crate::{Message, MessageType, Prefix};

const IRC_BOLD: char = '\x02';
const CTCP_DELIMITER: char = '\x01';

/// Fields of a channel message, ready to be posted on the other platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicMessage {
    pub channel: String,
    /// Sender nickname
    pub sender: String,
    /// Full `nick!user@host`, or the server name for server notices
    pub hostmask: String,
    pub text: String,
}

/// Content produced on the other platform for one IRC channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: String,
    pub raw_text: String,
    /// Replaces `raw_text` when set
    pub content_override: Option<String>,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            raw_text: raw_text.into(),
            content_override: None,
        }
    }

    pub fn with_override(mut self, content: impl Into<String>) -> Self {
        self.content_override = Some(content.into());
        self
    }
}

/// Message formatting collaborator
pub trait RelayFormatter: Send + Sync {
    /// Fields for a channel PRIVMSG, or `None` when it should not be relayed
    fn parse_public_message(&self, message: &Message) -> Option<PublicMessage>;

    /// IRC text for an outbound message
    fn format_outbound(&self, message: &OutboundMessage) -> String;

    /// Notice announcing an edited message
    fn format_edit(&self, author: &str, content: &str) -> String;

    /// Notice announcing a reaction to a message
    fn format_reaction(&self, user: &str, reaction: &str, content: &str) -> String;

    /// Channel message describing a ban or unban
    fn format_ban_notice(&self, change: &ModeChange) -> PublicMessage;
}

/// Remove mIRC colour and style control codes
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x03' => {
                // \x03FG[,BG] with up to two digits each
                for _ in 0..2 {
                    if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                        break;
                    }
                }
                if chars.peek() == Some(&',') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek().map_or(false, |c| c.is_ascii_digit()) {
                        chars.next();
                        for _ in 0..2 {
                            if chars.next_if(|c| c.is_ascii_digit()).is_none() {
                                break;
                            }
                        }
                    }
                }
            }
            '\x02' | '\x0f' | '\x11' | '\x16' | '\x1d' | '\x1e' | '\x1f' => {}
            other => out.push(other),
        }
    }
    out
}

/// Formatter that relays text with styling stripped and no decoration
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl RelayFormatter for PlainFormatter {
    fn parse_public_message(&self, message: &Message) -> Option<PublicMessage> {
        if message.command != MessageType::PrivMsg || message.params.len() < 2 {
            return None;
        }
        let prefix = message.prefix.as_ref()?;
        let channel = &message.params[0];
        let mut text = message.params[1].as_str();

        let action;
        if let Some(ctcp) = text.strip_prefix(CTCP_DELIMITER) {
            let ctcp = ctcp.trim_end_matches(CTCP_DELIMITER);
            // Only /me survives; other CTCP requests are not conversation
            let body = ctcp.strip_prefix("ACTION ")?;
            action = format!("* {} {}", prefix.nick(), body);
            text = &action;
        }

        let text = strip_formatting(text).trim().to_string();
        if text.is_empty() {
            return None;
        }

        Some(PublicMessage {
            channel: channel.clone(),
            sender: prefix.nick().to_string(),
            hostmask: prefix.to_string(),
            text,
        })
    }

    fn format_outbound(&self, message: &OutboundMessage) -> String {
        message
            .content_override
            .clone()
            .unwrap_or_else(|| message.raw_text.clone())
    }

    fn format_edit(&self, author: &str, content: &str) -> String {
        format!("{IRC_BOLD}{author}{IRC_BOLD} edited: {content}")
    }

    fn format_reaction(&self, user: &str, reaction: &str, content: &str) -> String {
        format!("{IRC_BOLD}{user}{IRC_BOLD} reacted with {reaction} to \"{content}\"")
    }

    fn format_ban_notice(&self, change: &ModeChange) -> PublicMessage {
        let (sender, hostmask) = match &change.setter {
            Some(prefix @ Prefix::User { .. }) => (prefix.nick().to_string(), prefix.to_string()),
            Some(Prefix::Server(name)) => (name.clone(), name.clone()),
            None => ("server".to_string(), "server".to_string()),
        };
        let verb = match change.action {
            ModeAction::Ban => "banned",
            ModeAction::Unban => "unbanned",
        };

        PublicMessage {
            channel: change.channel.clone(),
            text: format!("{} {} {}", sender, verb, change.target),
            sender,
            hostmask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::parse_mode_change;

    #[test]
    fn test_strip_formatting() {
        assert_eq!(strip_formatting("\x02bold\x02 plain"), "bold plain");
        assert_eq!(strip_formatting("\x0304,12red\x03 done"), "red done");
        assert_eq!(strip_formatting("\x034,x"), ",x");
        assert_eq!(strip_formatting("a\x1fb\x0fc"), "abc");
    }

    #[test]
    fn test_parse_public_message() {
        let msg = Message::parse(":alice!a@host PRIVMSG #rust :\x02hello\x02 there").unwrap();
        let fields = PlainFormatter.parse_public_message(&msg).unwrap();
        assert_eq!(fields.channel, "#rust");
        assert_eq!(fields.sender, "alice");
        assert_eq!(fields.hostmask, "alice!a@host");
        assert_eq!(fields.text, "hello there");
    }

    #[test]
    fn test_action_and_ctcp() {
        let msg = Message::parse(":alice!a@host PRIVMSG #rust :\x01ACTION waves\x01").unwrap();
        assert_eq!(
            PlainFormatter.parse_public_message(&msg).unwrap().text,
            "* alice waves"
        );

        let msg = Message::parse(":alice!a@host PRIVMSG #rust :\x01VERSION\x01").unwrap();
        assert!(PlainFormatter.parse_public_message(&msg).is_none());
    }

    #[test]
    fn test_empty_message_dropped() {
        let msg = Message::parse(":alice!a@host PRIVMSG #rust :\x02\x02  ").unwrap();
        assert!(PlainFormatter.parse_public_message(&msg).is_none());
    }

    #[test]
    fn test_outbound_override_wins() {
        let msg = OutboundMessage::new("#rust", "original");
        assert_eq!(PlainFormatter.format_outbound(&msg), "original");
        let msg = msg.with_override("replaced");
        assert_eq!(PlainFormatter.format_outbound(&msg), "replaced");
    }

    #[test]
    fn test_ban_notice() {
        let msg = Message::parse(":op!o@staff MODE #chan +b *!*@spam").unwrap();
        let change = parse_mode_change(&msg).unwrap();
        let notice = PlainFormatter.format_ban_notice(&change);
        assert_eq!(notice.channel, "#chan");
        assert_eq!(notice.text, "op banned *!*@spam");
        assert_eq!(notice.hostmask, "op!o@staff");
    }
}
