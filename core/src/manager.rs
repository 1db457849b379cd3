//! IRC connection lifecycle
//!
//! [`ConnectionManager`] owns the transport and every piece of connection
//! state. It is driven by [`ConnectionManager::run`] on a single execution
//! context: wire messages, rejoin ticks and commands from the application are
//! all handled serially in one `select!` loop, so nothing here needs a lock.
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready
//!      ^              |               |             |
//!      +--------------+---------------+-------------+  (failure / disconnect)
//! ```

use crate::chunk::ChunkEncoder;
use crate::config::RelayConfig;
use crate::dispatch::{Command, EventSink, RelayEvent};
use crate::format::RelayFormatter;
use crate::moderation::{self, ModeAction};
use crate::reconnect::ReconnectionState;
use crate::roster::{ChannelRoster, RelaySnapshot};
use crate::transport::Transport;
use crate::watchdog::{MembershipWatchdog, RejoinTick};
use crate::{Error, Message, MessageType, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

const RPL_WELCOME: u16 = 1;
const RPL_NAMREPLY: u16 = 353;
const ERR_NICKNAMEINUSE: u16 = 433;
const RPL_SASLSUCCESS: u16 = 903;
const ERR_SASLFAIL: u16 = 904;
const ERR_SASLTOOLONG: u16 = 905;

/// SASL payloads are sent in pieces of this size
const SASL_CHUNK: usize = 400;

const CTCP_DELIMITER: char = '\x01';
const CTCP_VERSION: &str = concat!("ircrelay ", env!("CARGO_PKG_VERSION"));

/// Connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

fn is_channel(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

/// Errors after which the current socket cannot be trusted
fn is_connection_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::Io(_) | Error::Connection(_) | Error::Auth(_) | Error::NicknameExhausted { .. }
    )
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owner of the IRC connection
pub struct ConnectionManager<T: Transport> {
    config: RelayConfig,
    transport: T,
    state: ConnectionState,
    /// Id of the current connection attempt, for log correlation
    session: Option<Uuid>,
    nickname: String,
    nick_attempts: u32,
    sasl_pending: bool,
    /// Set once the first welcome arrives; never cleared
    ready: bool,
    roster: ChannelRoster,
    watchdog: Option<MembershipWatchdog>,
    watchdog_generation: u64,
    ticks_tx: mpsc::UnboundedSender<RejoinTick>,
    ticks_rx: mpsc::UnboundedReceiver<RejoinTick>,
    last_rejoin: Option<DateTime<Utc>>,
    reconnect: ReconnectionState,
    last_message_sent: Option<Instant>,
    fault: Option<String>,
    events: EventSink,
    formatter: Arc<dyn RelayFormatter>,
    snapshot: watch::Sender<RelaySnapshot>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        config: RelayConfig,
        transport: T,
        events: EventSink,
        formatter: Arc<dyn RelayFormatter>,
    ) -> Self {
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(RelaySnapshot::new(&config.identity.nickname));

        Self {
            nickname: config.identity.nickname.clone(),
            reconnect: ReconnectionState::new(&config.timing),
            config,
            transport,
            state: ConnectionState::Disconnected,
            session: None,
            nick_attempts: 0,
            sasl_pending: false,
            ready: false,
            roster: ChannelRoster::new(),
            watchdog: None,
            watchdog_generation: 0,
            ticks_tx,
            ticks_rx,
            last_rejoin: None,
            last_message_sent: None,
            fault: None,
            events,
            formatter,
            snapshot,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id of the current or most recent connection attempt
    pub fn session(&self) -> Option<Uuid> {
        self.session
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn roster(&self) -> &ChannelRoster {
        &self.roster
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The live watchdog, if any
    pub fn watchdog(&self) -> Option<&MembershipWatchdog> {
        self.watchdog.as_ref()
    }

    pub fn reconnection(&self) -> &ReconnectionState {
        &self.reconnect
    }

    /// Receiver for the snapshots this manager publishes
    pub fn subscribe(&self) -> watch::Receiver<RelaySnapshot> {
        self.snapshot.subscribe()
    }

    fn publish(&self) {
        self.snapshot.send_replace(RelaySnapshot {
            state: self.state,
            ready: self.ready,
            wire_connected: self.transport.is_connected(),
            nickname: self.nickname.clone(),
            roster: self.roster.clone(),
            last_rejoin: self.last_rejoin,
            fault: self.fault.clone(),
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!("IRC connection {} -> {}", self.state, state);
            self.state = state;
        }
        self.publish();
    }

    fn record_fault(&mut self, fault: impl Into<String>) {
        let fault = fault.into();
        tracing::warn!("IRC relay fault: {}", fault);
        self.fault = Some(fault);
        self.publish();
    }

    /// Unthrottled write, used for registration and protocol replies
    async fn write(&mut self, message: Message) -> Result<()> {
        tracing::debug!("-> {}", message);
        self.transport.send(&message).await
    }

    /// Write honouring the configured minimum gap between lines
    async fn write_throttled(&mut self, message: Message) -> Result<()> {
        let interval = self.config.timing.message_interval();
        if let Some(last) = self.last_message_sent {
            tokio::time::sleep_until(last + interval).await;
        }
        let result = self.write(message).await;
        self.last_message_sent = Some(Instant::now());
        result
    }

    /// Open the transport and send registration
    ///
    /// Moves `Disconnected -> Connecting -> Authenticating`; on failure the
    /// state returns to `Disconnected` and the error is handed back.
    pub async fn connect(&mut self) -> Result<()> {
        let session = Uuid::new_v4();
        self.session = Some(session);
        self.nickname = self.config.identity.nickname.clone();
        self.nick_attempts = 0;
        self.set_state(ConnectionState::Connecting);

        tracing::info!(
            "Connecting to {}:{} (tls: {}, session {})",
            self.config.server.host,
            self.config.server.port,
            self.config.server.tls,
            session
        );

        if let Err(e) = self.transport.open(&self.config.server).await {
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        self.set_state(ConnectionState::Authenticating);
        if let Err(e) = self.register().await {
            self.transport.close().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    async fn register(&mut self) -> Result<()> {
        let identity = self.config.identity.clone();

        if identity.sasl {
            self.sasl_pending = true;
            self.write(Message::new(
                MessageType::Cap,
                vec!["REQ".to_string(), "sasl".to_string()],
            ))
            .await?;
        }
        if let Some(password) = self.config.server.password.clone() {
            self.write(Message::new(MessageType::Password, vec![password])).await?;
        }
        self.write(Message::nick(&identity.nickname)).await?;
        self.write(Message::new(
            MessageType::User,
            vec![
                identity.username,
                "0".to_string(),
                "*".to_string(),
                identity.realname,
            ],
        ))
        .await
    }

    /// Registration finished: become `Ready`, join channels, arm the watchdog
    pub async fn on_welcome(&mut self, nickname: &str) -> Result<()> {
        tracing::info!("Connected to IRC as {}", nickname);
        self.nickname = nickname.to_string();
        self.ready = true;
        self.fault = None;
        self.reconnect.reset();
        self.set_state(ConnectionState::Ready);

        self.join_configured().await?;
        self.start_watchdog();
        self.events.submit(RelayEvent::Welcome {
            nickname: self.nickname.clone(),
        });
        Ok(())
    }

    /// Replace the rejoin timer; the previous one is cancelled first
    fn start_watchdog(&mut self) {
        if let Some(mut previous) = self.watchdog.take() {
            previous.cancel();
        }
        self.watchdog_generation += 1;
        self.watchdog = Some(MembershipWatchdog::start(
            self.watchdog_generation,
            self.config.timing.rejoin_interval(),
            self.ticks_tx.clone(),
        ));
    }

    fn stop_watchdog(&mut self) {
        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.cancel();
        }
    }

    /// Watchdog firing: re-join the whole configured set
    pub async fn on_rejoin_tick(&mut self, tick: RejoinTick) -> Result<()> {
        let live = self.watchdog.as_ref().map(MembershipWatchdog::generation);
        if live != Some(tick.generation) {
            tracing::trace!("Ignoring tick from retired watchdog {}", tick.generation);
            return Ok(());
        }
        self.last_rejoin = Some(tick.fired_at);
        self.join_configured().await?;
        self.publish();
        Ok(())
    }

    async fn join_configured(&mut self) -> Result<()> {
        let channels = self.config.channels.clone();
        for channel in &channels {
            self.request_join(channel).await?;
        }
        Ok(())
    }

    /// Ask the server to join `channel`
    ///
    /// A no-op outside `Ready`. Repeated joins are harmless: the server
    /// ignores them and the roster is keyed by channel.
    pub async fn request_join(&mut self, channel: &str) -> Result<()> {
        if self.state != ConnectionState::Ready {
            tracing::debug!("Not joining {} while {}", channel, self.state);
            return Ok(());
        }
        tracing::info!("Joining {}", channel);
        self.write(Message::join(channel)).await
    }

    /// Nickname in use during registration: append the suffix and retry
    pub async fn on_nickname_collision(&mut self) -> Result<()> {
        self.nick_attempts += 1;
        if let Some(limit) = self.config.nick.max_attempts {
            if self.nick_attempts > limit {
                let error = Error::NicknameExhausted {
                    attempts: limit,
                    last: self.nickname.clone(),
                };
                self.record_fault(error.to_string());
                return Err(error);
            }
        }

        self.nickname.push(self.config.nick.collision_suffix);
        tracing::warn!("Nickname in use, trying {}", self.nickname);
        let nickname = self.nickname.clone();
        self.write(Message::nick(&nickname)).await
    }

    /// Connection lost: tear down and return the delay before reconnecting
    pub async fn on_disconnect(&mut self, reason: &str) -> Duration {
        tracing::error!("Disconnected from IRC - Attempting reconnection: {}", reason);
        self.transport.close().await;
        self.stop_watchdog();
        self.roster.clear();
        self.sasl_pending = false;
        self.reconnect.record_disconnect();
        self.set_state(ConnectionState::Disconnected);
        self.reconnect.next_delay()
    }

    /// Relay text to a channel, one PRIVMSG per fragment
    ///
    /// Fails with [`Error::NotConnected`] unless `Ready`, without touching
    /// the wire. Line breaks start a new message.
    pub async fn send(&mut self, channel: &str, text: &str) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(Error::NotConnected);
        }
        for line in text.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
            for fragment in ChunkEncoder::new(line) {
                self.write_throttled(Message::privmsg(channel, fragment)).await?;
            }
        }
        Ok(())
    }

    /// Write a ban or unban verbatim
    pub async fn issue_mode_change(
        &mut self,
        channel: &str,
        action: ModeAction,
        target: &str,
    ) -> Result<()> {
        let command = moderation::mode_command(channel, action, target)?;
        if self.state != ConnectionState::Ready {
            return Err(Error::NotConnected);
        }
        tracing::info!("Setting {} {} on {}", action, target, channel);
        self.write(command).await
    }

    pub async fn ban_or_unban(&mut self, identity: &str, channel: &str, action: ModeAction) -> Result<()> {
        self.issue_mode_change(channel, action, identity).await
    }

    /// Cached operator status, no wire round-trip
    pub fn is_operator(&self, channel: &str, identity: &str) -> bool {
        self.roster.is_operator(channel, identity)
    }

    fn is_me(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.nickname)
    }

    /// Process one inbound wire message
    pub async fn handle_message(&mut self, message: Message) -> Result<()> {
        tracing::trace!("<- {}", message);

        if let Some(numeric) = message.numeric() {
            return self.handle_numeric(numeric, &message).await;
        }

        match message.command {
            MessageType::Ping => {
                let pong = Message::new(MessageType::Pong, message.params.clone());
                self.write(pong).await
            }
            MessageType::Cap => self.handle_cap(&message).await,
            MessageType::Authenticate => self.handle_authenticate(&message).await,
            MessageType::Join => {
                self.handle_join(&message);
                Ok(())
            }
            MessageType::Part => self.handle_part(&message).await,
            MessageType::Kick => {
                self.handle_kick(&message);
                Ok(())
            }
            MessageType::Quit => {
                if let Some(nick) = message.source_nick() {
                    self.roster.forget_everywhere(nick);
                    self.publish();
                }
                Ok(())
            }
            MessageType::Nick => {
                self.handle_nick(&message);
                Ok(())
            }
            MessageType::Mode => {
                self.handle_mode(&message);
                Ok(())
            }
            MessageType::PrivMsg => self.handle_privmsg(&message).await,
            MessageType::Error => {
                tracing::warn!("Server error: {}", message.params.join(" "));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn handle_numeric(&mut self, numeric: u16, message: &Message) -> Result<()> {
        match numeric {
            RPL_WELCOME => {
                let nickname = message
                    .params
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.nickname.clone());
                self.on_welcome(&nickname).await
            }
            ERR_NICKNAMEINUSE if self.state == ConnectionState::Authenticating => {
                self.on_nickname_collision().await
            }
            RPL_NAMREPLY => {
                // :server 353 me = #channel :@op +voice nick
                if let (Some(channel), Some(names)) = (message.params.get(2), message.params.get(3)) {
                    self.roster.apply_names(channel, names);
                    self.publish();
                }
                Ok(())
            }
            RPL_SASLSUCCESS => {
                tracing::info!("SASL authentication succeeded");
                self.finish_sasl().await
            }
            ERR_SASLFAIL | ERR_SASLTOOLONG => {
                let error = Error::Auth(format!(
                    "SASL authentication failed: {}",
                    message.params.last().map(String::as_str).unwrap_or("")
                ));
                self.record_fault(error.to_string());
                Err(error)
            }
            _ => Ok(()),
        }
    }

    async fn finish_sasl(&mut self) -> Result<()> {
        if !self.sasl_pending {
            return Ok(());
        }
        self.sasl_pending = false;
        self.write(Message::new(MessageType::Cap, vec!["END".to_string()])).await
    }

    async fn handle_cap(&mut self, message: &Message) -> Result<()> {
        // :server CAP * ACK :sasl
        let subcommand = message.params.get(1).map(String::as_str).unwrap_or("");
        let caps = message.params.get(2).map(String::as_str).unwrap_or("");
        let sasl_listed = caps.split_whitespace().any(|c| c == "sasl");

        match subcommand {
            "ACK" if sasl_listed && self.sasl_pending => {
                self.write(Message::new(MessageType::Authenticate, vec!["PLAIN".to_string()]))
                    .await
            }
            "NAK" if sasl_listed => {
                self.record_fault("Server refused SASL, continuing unauthenticated");
                self.finish_sasl().await
            }
            _ => Ok(()),
        }
    }

    async fn handle_authenticate(&mut self, message: &Message) -> Result<()> {
        if message.params.first().map(String::as_str) != Some("+") || !self.sasl_pending {
            return Ok(());
        }
        let account = self.config.identity.username.clone();
        let password = self.config.server.password.clone().unwrap_or_default();
        let encoded = STANDARD.encode(format!("{account}\0{account}\0{password}"));

        let pieces: Vec<String> = ChunkEncoder::with_limit(&encoded, SASL_CHUNK)
            .fragments()
            .map(str::to_string)
            .collect();
        for piece in pieces {
            self.write(Message::new(MessageType::Authenticate, vec![piece])).await?;
        }
        if encoded.len() % SASL_CHUNK == 0 {
            self.write(Message::new(MessageType::Authenticate, vec!["+".to_string()]))
                .await?;
        }
        Ok(())
    }

    fn handle_join(&mut self, message: &Message) {
        let (Some(nick), Some(channel)) = (message.source_nick(), message.params.first()) else {
            return;
        };
        if self.is_me(nick) {
            if self.roster.insert(channel) {
                tracing::info!("Joined {}", channel);
            }
            self.publish();
        }
    }

    async fn handle_part(&mut self, message: &Message) -> Result<()> {
        let (Some(nick), Some(channel)) = (message.source_nick(), message.params.first()) else {
            return Ok(());
        };
        if !self.is_me(nick) {
            self.roster.forget_member(channel, nick);
            self.publish();
            return Ok(());
        }

        let channel = channel.clone();
        tracing::warn!("Left {}, rejoining configured channels", channel);
        self.roster.remove(&channel);
        self.publish();
        self.events.submit(RelayEvent::ChannelParted { channel });
        self.join_configured().await
    }

    fn handle_kick(&mut self, message: &Message) {
        let (Some(channel), Some(victim)) = (message.params.first(), message.params.get(1)) else {
            return;
        };
        if self.is_me(victim) {
            // Left to the watchdog rather than rejoining straight into a kick loop
            tracing::warn!("Kicked from {}", channel);
            self.roster.remove(channel);
            self.events.submit(RelayEvent::ChannelParted {
                channel: channel.clone(),
            });
        } else {
            self.roster.forget_member(channel, victim);
        }
        self.publish();
    }

    fn handle_nick(&mut self, message: &Message) {
        let (Some(old), Some(new)) = (message.source_nick(), message.params.first()) else {
            return;
        };
        let (old, new) = (old.to_string(), new.clone());
        if self.is_me(&old) {
            self.nickname = new.clone();
        }
        self.roster.rename_member(&old, &new);
        self.publish();
    }

    fn handle_mode(&mut self, message: &Message) {
        let Some(channel) = message.params.first().filter(|c| is_channel(c)) else {
            return;
        };

        let changes = moderation::operator_changes(message);
        if !changes.is_empty() {
            for (nick, op) in changes {
                self.roster.set_operator(channel, &nick, op);
            }
            self.publish();
        }

        if let Some(change) = moderation::parse_mode_change(message) {
            self.events.submit(RelayEvent::ModeChange(change));
        }
    }

    async fn handle_privmsg(&mut self, message: &Message) -> Result<()> {
        let (Some(target), Some(text)) = (message.params.first(), message.params.get(1)) else {
            tracing::debug!("Dropping malformed PRIVMSG: {}", message);
            return Ok(());
        };

        if is_channel(target) {
            match self.formatter.parse_public_message(message) {
                Some(fields) => self.events.submit(RelayEvent::PublicMessage(fields)),
                None => tracing::debug!("Not relaying message in {}", target),
            }
        } else if self.is_me(target) {
            let Some(sender) = message.source_nick() else {
                return Ok(());
            };
            if let Some(request) = text.strip_prefix(CTCP_DELIMITER) {
                let request = request.trim_end_matches(CTCP_DELIMITER).to_string();
                return self.answer_ctcp(sender.to_string(), &request).await;
            }
            if text.trim().is_empty() {
                return Ok(());
            }
            self.events.submit(RelayEvent::PrivateMessage {
                sender: sender.to_string(),
                text: text.clone(),
                raw: message.clone(),
            });
        }
        Ok(())
    }

    /// Reply to VERSION and PING; other CTCP requests are ignored
    async fn answer_ctcp(&mut self, sender: String, request: &str) -> Result<()> {
        let (command, argument) = request.split_once(' ').unwrap_or((request, ""));
        let reply = match command.to_ascii_uppercase().as_str() {
            "VERSION" => format!("VERSION {}", CTCP_VERSION),
            "PING" => format!("PING {}", argument).trim_end().to_string(),
            other => {
                tracing::debug!("Ignoring CTCP {} from {}", other, sender);
                return Ok(());
            }
        };
        tracing::debug!("Answering CTCP {} from {}", command, sender);
        let body = format!("{CTCP_DELIMITER}{reply}{CTCP_DELIMITER}");
        self.write(Message::new(MessageType::Notice, vec![sender, body])).await
    }

    /// Execute a request from the application runtime
    ///
    /// Returns the failure reason when the request broke the connection.
    pub async fn execute(&mut self, command: Command) -> Option<String> {
        let (result, reply) = match command {
            Command::Send { message, reply } => {
                let text = self.formatter.format_outbound(&message);
                (self.send(&message.channel, &text).await, reply)
            }
            Command::Join { channel, reply } => (self.request_join(&channel).await, reply),
            Command::Mode {
                channel,
                action,
                target,
                reply,
            } => (self.issue_mode_change(&channel, action, &target).await, reply),
            Command::Shutdown { reason } => {
                self.shutdown(reason.as_deref()).await;
                return None;
            }
        };

        match result {
            Err(e) if is_connection_fatal(&e) => {
                let reason = e.to_string();
                let _ = reply.send(Err(Error::Connection(reason.clone())));
                Some(reason)
            }
            other => {
                let _ = reply.send(other);
                None
            }
        }
    }

    /// Graceful stop: QUIT, cancel the watchdog, close the socket
    pub async fn shutdown(&mut self, reason: Option<&str>) {
        tracing::info!("Shutting down IRC connection");
        if self.state != ConnectionState::Disconnected {
            let params = reason.map(|r| vec![r.to_string()]).unwrap_or_default();
            if let Err(e) = self.write(Message::new(MessageType::Quit, params)).await {
                tracing::debug!("Failed to send QUIT: {}", e);
            }
        }
        self.stop_watchdog();
        self.transport.close().await;
        self.roster.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Drive the connection until shutdown or until every handle is dropped
    ///
    /// Connects immediately, then reconnects after every disconnect with the
    /// configured backoff.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut reconnect_at = Some(Instant::now());

        loop {
            let open = self.state != ConnectionState::Disconnected;
            let mut lost: Option<String> = None;

            tokio::select! {
                _ = wait_until(reconnect_at) => {
                    reconnect_at = None;
                    self.reconnect.record_attempt();
                    if let Err(e) = self.connect().await {
                        self.record_fault(format!("Connection attempt failed: {}", e));
                        lost = Some(e.to_string());
                    }
                }
                inbound = self.transport.recv(), if open => {
                    match inbound {
                        Some(Ok(message)) => {
                            if let Err(e) = self.handle_message(message).await {
                                if is_connection_fatal(&e) {
                                    lost = Some(e.to_string());
                                } else {
                                    tracing::debug!("Error handling IRC message: {}", e);
                                }
                            }
                        }
                        Some(Err(Error::MessageParse(e))) => {
                            tracing::debug!("Dropping malformed line: {}", e);
                        }
                        Some(Err(e)) => lost = Some(e.to_string()),
                        None => lost = Some("connection closed by server".to_string()),
                    }
                }
                Some(tick) = self.ticks_rx.recv() => {
                    if let Err(e) = self.on_rejoin_tick(tick).await {
                        if is_connection_fatal(&e) {
                            lost = Some(e.to_string());
                        }
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown { reason }) => {
                            self.shutdown(reason.as_deref()).await;
                            break;
                        }
                        Some(command) => lost = self.execute(command).await,
                        None => {
                            self.shutdown(None).await;
                            break;
                        }
                    }
                }
            }

            if let Some(reason) = lost {
                let delay = self.on_disconnect(&reason).await;
                tracing::info!("Reconnecting in {}s", delay.as_secs());
                reconnect_at = Some(Instant::now() + delay);
            }
        }

        tracing::info!("IRC connection loop stopped");
    }
}
