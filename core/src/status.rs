//! Human-readable relay health

use crate::dispatch::CounterpartRegistry;
use crate::roster::RelaySnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub const STATUS_NOT_READY: &str = "Not ready";
pub const STATUS_BRIDGE_FAILURE: &str = "Discord failure";
pub const STATUS_NOT_CONNECTED: &str = "Not connected";
pub const STATUS_CONNECTED: &str = "Connected";
pub const NO_CHANNELS: &str = "No channels";

/// The three fields shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub status: String,
    pub name: String,
    pub channels: String,
}

/// Classify health; earlier checks win
pub fn classify(ready: bool, counterpart_registered: bool, wire_connected: bool) -> &'static str {
    if !ready {
        STATUS_NOT_READY
    } else if !counterpart_registered {
        STATUS_BRIDGE_FAILURE
    } else if !wire_connected {
        STATUS_NOT_CONNECTED
    } else {
        STATUS_CONNECTED
    }
}

/// Build the status fields from one snapshot
pub fn report(snapshot: &RelaySnapshot, counterpart_registered: bool, name: &str) -> RelayStatus {
    let channels = snapshot.roster.names().join(", ");
    let channels = if channels.trim().is_empty() {
        NO_CHANNELS.to_string()
    } else {
        channels
    };

    RelayStatus {
        status: classify(snapshot.ready, counterpart_registered, snapshot.wire_connected).to_string(),
        name: name.to_string(),
        channels,
    }
}

/// Reads published snapshots; safe to use from any thread
#[derive(Clone)]
pub struct StatusReporter {
    snapshot: watch::Receiver<RelaySnapshot>,
    registry: CounterpartRegistry,
    name: String,
}

impl StatusReporter {
    /// `name` is the configured identity, reported even while a suffixed
    /// nickname is in use
    pub fn new(
        snapshot: watch::Receiver<RelaySnapshot>,
        registry: CounterpartRegistry,
        name: impl Into<String>,
    ) -> Self {
        Self {
            snapshot,
            registry,
            name: name.into(),
        }
    }

    pub fn status(&self) -> RelayStatus {
        let snapshot = self.snapshot.borrow();
        report(&snapshot, self.registry.is_registered(), &self.name)
    }

    /// Last recorded fault, if the connection is currently degraded
    pub fn fault(&self) -> Option<String> {
        self.snapshot.borrow().fault.clone()
    }
}
