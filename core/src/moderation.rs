//! Ban/unban mirroring
//!
//! Inbound `MODE <channel> +b|-b <mask>` lines become [`ModeChange`] events;
//! outbound requests become `MODE <channel> <action> <identity>` commands.
//! Every other channel mode is ignored here, apart from `+o/-o` which the
//! roster tracks to answer operator queries.

use crate::{Error, Message, MessageType, Prefix, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel modes whose argument is consumed on both `+` and `-`
const PARAM_ALWAYS: &str = "ovhbeIqak";
/// Channel modes whose argument is consumed only when set
const PARAM_ON_SET: &str = "lfj";

/// The two mode changes the relay mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeAction {
    Ban,
    Unban,
}

impl ModeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeAction::Ban => "+b",
            ModeAction::Unban => "-b",
        }
    }
}

impl fmt::Display for ModeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "+b" => Ok(ModeAction::Ban),
            "-b" => Ok(ModeAction::Unban),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// A ban or unban seen on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub channel: String,
    pub action: ModeAction,
    /// Ban mask the mode applies to
    pub target: String,
    /// Who set the mode, when the server said so
    pub setter: Option<Prefix>,
}

fn is_channel(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

/// Translate a MODE line into a ban/unban event
///
/// Only a mode string of exactly `+b` or `-b` with a target qualifies.
pub fn parse_mode_change(message: &Message) -> Option<ModeChange> {
    if message.command != MessageType::Mode {
        return None;
    }
    let channel = message.params.first().filter(|c| is_channel(c))?;
    let action = message.params.get(1)?.parse::<ModeAction>().ok()?;
    let target = message.params.get(2).filter(|t| !t.is_empty())?;

    Some(ModeChange {
        channel: channel.clone(),
        action,
        target: target.clone(),
        setter: message.prefix.clone(),
    })
}

/// Build the wire command for a ban or unban
pub fn mode_command(channel: &str, action: ModeAction, identity: &str) -> Result<Message> {
    if !is_channel(channel) {
        return Err(Error::InvalidMode(format!("'{}' is not a channel", channel)));
    }
    if identity.is_empty() || identity.contains([' ', '\r', '\n']) {
        return Err(Error::InvalidMode(format!("invalid ban target '{}'", identity)));
    }
    Ok(Message::mode(channel, action.as_str(), identity))
}

/// Operator grants and removals in a channel MODE line, in order
pub fn operator_changes(message: &Message) -> Vec<(String, bool)> {
    let mut changes = Vec::new();
    if message.command != MessageType::Mode || message.params.len() < 2 {
        return changes;
    }
    if !is_channel(&message.params[0]) {
        return changes;
    }

    let mut args = message.params[2..].iter();
    let mut adding = true;
    for mode in message.params[1].chars() {
        match mode {
            '+' => adding = true,
            '-' => adding = false,
            'o' => {
                if let Some(nick) = args.next() {
                    changes.push((nick.clone(), adding));
                }
            }
            m if PARAM_ALWAYS.contains(m) || (adding && PARAM_ON_SET.contains(m)) => {
                args.next();
            }
            _ => {}
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_command_exact_wire_text() {
        let msg = mode_command("#chan", ModeAction::Ban, "host!user@mask").unwrap();
        assert_eq!(msg.to_line(), "MODE #chan +b host!user@mask\r\n");

        let msg = mode_command("#chan", ModeAction::Unban, "*!*@bad.example").unwrap();
        assert_eq!(msg.to_string(), "MODE #chan -b *!*@bad.example");
    }

    #[test]
    fn test_mode_command_rejects_bad_input() {
        assert!(mode_command("chan", ModeAction::Ban, "a!b@c").is_err());
        assert!(mode_command("#chan", ModeAction::Ban, "").is_err());
        assert!(mode_command("#chan", ModeAction::Ban, "a b").is_err());
    }

    #[test]
    fn test_parse_ban_and_unban() {
        let msg = Message::parse(":op!o@staff MODE #chan +b *!*@spam.example").unwrap();
        let change = parse_mode_change(&msg).unwrap();
        assert_eq!(change.action, ModeAction::Ban);
        assert_eq!(change.channel, "#chan");
        assert_eq!(change.target, "*!*@spam.example");
        assert_eq!(change.setter.unwrap().nick(), "op");

        let msg = Message::parse(":op!o@staff MODE #chan -b *!*@spam.example").unwrap();
        assert_eq!(parse_mode_change(&msg).unwrap().action, ModeAction::Unban);
    }

    #[test]
    fn test_other_modes_ignored() {
        for line in [
            ":op!o@staff MODE #chan +o someone",
            ":op!o@staff MODE #chan +bb a b",
            ":op!o@staff MODE #chan +q quiet!*@*",
            ":relay MODE relay +i",
            ":op!o@staff MODE #chan +b",
        ] {
            let msg = Message::parse(line).unwrap();
            assert!(parse_mode_change(&msg).is_none(), "{}", line);
        }
    }

    #[test]
    fn test_operator_changes_skip_other_arguments() {
        let msg = Message::parse(":x MODE #c +bo-vo+l *!*@h alice bob carol 20").unwrap();
        assert_eq!(
            operator_changes(&msg),
            vec![("alice".to_string(), true), ("carol".to_string(), false)]
        );
    }

    #[test]
    fn test_action_round_trip_from_str() {
        assert_eq!("+b".parse::<ModeAction>().unwrap(), ModeAction::Ban);
        assert!("+o".parse::<ModeAction>().is_err());
        assert_eq!(ModeAction::Unban.to_string(), "-b");
    }
}
