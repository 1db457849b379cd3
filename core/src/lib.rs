//! IRC Relay Core
//!
//! This crate provides the connection side of a chat bridge: a single IRC
//! connection that keeps itself registered and joined to a configured set of
//! channels, and two queues that carry traffic to and from the application
//! on the other side of the bridge.

pub mod chunk;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod manager;
pub mod message;
pub mod moderation;
pub mod reconnect;
pub mod relay;
pub mod roster;
pub mod status;
pub mod transport;
pub mod watchdog;

pub use chunk::{ChunkEncoder, MAX_FRAGMENT_BYTES};
pub use config::RelayConfig;
pub use dispatch::{
    Command, CounterpartRegistry, Dispatcher, EventSink, FatalShutdown, Pending, RelayCounterpart,
    RelayEvent, RelayHandle,
};
pub use error::{Error, Result};
pub use format::{OutboundMessage, PlainFormatter, PublicMessage, RelayFormatter};
pub use manager::{ConnectionManager, ConnectionState};
pub use message::{Message, MessageType, Prefix};
pub use moderation::{ModeAction, ModeChange};
pub use reconnect::ReconnectionState;
pub use relay::Relay;
pub use roster::{ChannelRoster, RelaySnapshot};
pub use status::{RelayStatus, StatusReporter};
pub use transport::{TcpTransport, Transport};
pub use watchdog::{MembershipWatchdog, RejoinTick, REJOIN_INTERVAL};

/// Re-exports for convenience
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use tracing::{debug, error, info, warn};
