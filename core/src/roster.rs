//! Channel roster and the read-only snapshot published to other threads

use crate::manager::ConnectionState;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Operator prefixes as sent in RPL_NAMREPLY
const OPERATOR_PREFIXES: [char; 3] = ['~', '&', '@'];
const MEMBER_PREFIXES: [char; 5] = ['~', '&', '@', '%', '+'];

/// Channels the relay currently sits in, keyed by lowercased name
///
/// Only ever mutated on the connection thread.
#[derive(Debug, Clone, Default)]
pub struct ChannelRoster {
    channels: BTreeMap<String, ChannelEntry>,
}

/// Per-channel cached state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEntry {
    /// Name as the server spelled it
    pub name: String,
    /// Lowercased nicknames holding channel operator status
    pub operators: BTreeSet<String>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl ChannelRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that we joined a channel; joining twice keeps a single entry
    pub fn insert(&mut self, channel: &str) -> bool {
        let k = key(channel);
        if self.channels.contains_key(&k) {
            return false;
        }
        self.channels.insert(
            k,
            ChannelEntry {
                name: channel.to_string(),
                operators: BTreeSet::new(),
            },
        );
        true
    }

    pub fn remove(&mut self, channel: &str) -> bool {
        self.channels.remove(&key(channel)).is_some()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(&key(channel))
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel names in stable order
    pub fn names(&self) -> Vec<String> {
        self.channels.values().map(|c| c.name.clone()).collect()
    }

    /// Apply one RPL_NAMREPLY member list
    pub fn apply_names(&mut self, channel: &str, members: &str) {
        let Some(entry) = self.channels.get_mut(&key(channel)) else {
            return;
        };
        for member in members.split_whitespace() {
            let nick = member.trim_start_matches(MEMBER_PREFIXES);
            if nick.is_empty() {
                continue;
            }
            if member.starts_with(OPERATOR_PREFIXES) {
                entry.operators.insert(key(nick));
            } else {
                entry.operators.remove(&key(nick));
            }
        }
    }

    /// Track `+o`/`-o` for a nickname
    pub fn set_operator(&mut self, channel: &str, nick: &str, op: bool) {
        if let Some(entry) = self.channels.get_mut(&key(channel)) {
            if op {
                entry.operators.insert(key(nick));
            } else {
                entry.operators.remove(&key(nick));
            }
        }
    }

    /// Somebody left or was kicked
    pub fn forget_member(&mut self, channel: &str, nick: &str) {
        self.set_operator(channel, nick, false);
    }

    /// Somebody quit the network
    pub fn forget_everywhere(&mut self, nick: &str) {
        let nick = key(nick);
        for entry in self.channels.values_mut() {
            entry.operators.remove(&nick);
        }
    }

    /// Follow a nickname change across every channel
    pub fn rename_member(&mut self, old: &str, new: &str) {
        let (old, new) = (key(old), key(new));
        for entry in self.channels.values_mut() {
            if entry.operators.remove(&old) {
                entry.operators.insert(new.clone());
            }
        }
    }

    pub fn is_operator(&self, channel: &str, nick: &str) -> bool {
        self.channels
            .get(&key(channel))
            .map(|entry| entry.operators.contains(&key(nick)))
            .unwrap_or(false)
    }
}

/// Immutable view of the connection, published after every change
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    pub state: ConnectionState,
    /// Registration has completed at least once; stays set across reconnects
    pub ready: bool,
    /// Whether the transport reports an open socket
    pub wire_connected: bool,
    /// Nickname currently in use
    pub nickname: String,
    pub roster: ChannelRoster,
    /// Last time the membership watchdog fired
    pub last_rejoin: Option<DateTime<Utc>>,
    /// Last visible fault, cleared on welcome
    pub fault: Option<String>,
}

impl RelaySnapshot {
    pub fn new(nickname: &str) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            ready: false,
            wire_connected: false,
            nickname: nickname.to_string(),
            roster: ChannelRoster::new(),
            last_rejoin: None,
            fault: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut roster = ChannelRoster::new();
        assert!(roster.insert("#Rust"));
        assert!(!roster.insert("#rust"));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.names(), vec!["#Rust"]);
    }

    #[test]
    fn test_operator_tracking() {
        let mut roster = ChannelRoster::new();
        roster.insert("#ops");
        roster.apply_names("#ops", "@Relay +voiced plain ~owner");
        assert!(roster.is_operator("#OPS", "relay"));
        assert!(roster.is_operator("#ops", "owner"));
        assert!(!roster.is_operator("#ops", "voiced"));

        roster.set_operator("#ops", "relay", false);
        assert!(!roster.is_operator("#ops", "relay"));

        roster.set_operator("#ops", "plain", true);
        roster.rename_member("plain", "renamed");
        assert!(roster.is_operator("#ops", "renamed"));
        assert!(!roster.is_operator("#unknown", "renamed"));
    }
}
