//! Cross-runtime dispatch
//!
//! The connection manager runs on its own thread and the bridge application
//! on its own tokio runtime. They never share the connection object; every
//! interaction is a message on one of two unbounded queues:
//!
//! * inbound, [`EventSink`] → [`Dispatcher`]: wire events become
//!   [`RelayEvent`]s that the dispatcher hands to the registered
//!   [`RelayCounterpart`], one at a time and in arrival order;
//! * outbound, [`RelayHandle`] → connection thread: each call enqueues a
//!   [`Command`] and returns immediately with a [`Pending`] completion.
//!
//! Neither side ever waits for the other.

use crate::format::{OutboundMessage, PublicMessage, RelayFormatter};
use crate::moderation::{ModeAction, ModeChange};
use crate::roster::RelaySnapshot;
use crate::{Error, Message, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Events produced by the connection manager from wire traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A PRIVMSG addressed to the relay itself
    PrivateMessage {
        sender: String,
        text: String,
        raw: Message,
    },
    /// A channel PRIVMSG, already parsed by the formatter
    PublicMessage(PublicMessage),
    /// A ban or unban on a channel
    ModeChange(ModeChange),
    /// The relay left or was removed from a channel
    ChannelParted { channel: String },
    /// Registration completed
    Welcome { nickname: String },
}

/// Receiver side of the bridge, living in the application's runtime
#[async_trait]
pub trait RelayCounterpart: Send + Sync {
    /// A private message sent to the relay's nickname
    async fn handle_direct_message(&self, text: String, raw: Message);

    /// A channel message (or ban notice) to mirror
    async fn handle_public_message(&self, fields: PublicMessage);

    async fn handle_channel_parted(&self, _channel: String) {}

    async fn handle_ready(&self, _nickname: String) {}
}

/// Registration point for the counterpart; shared by the dispatcher and the
/// status reporter
#[derive(Clone, Default)]
pub struct CounterpartRegistry {
    inner: Arc<RwLock<Option<Arc<dyn RelayCounterpart>>>>,
}

impl CounterpartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the counterpart, replacing any earlier one
    pub fn register(&self, counterpart: Arc<dyn RelayCounterpart>) {
        *self.inner.write() = Some(counterpart);
    }

    pub fn is_registered(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn get(&self) -> Option<Arc<dyn RelayCounterpart>> {
        self.inner.read().clone()
    }
}

/// Connection-thread end of the inbound queue
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<RelayEvent>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self { sender }
    }

    /// Fire-and-forget handoff to the application runtime
    pub fn submit(&self, event: RelayEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::debug!("No dispatcher listening, dropping {:?}", e.0);
        }
    }
}

/// Application-runtime end of the inbound queue
#[derive(Clone)]
pub struct Dispatcher {
    registry: CounterpartRegistry,
    formatter: Arc<dyn RelayFormatter>,
}

impl Dispatcher {
    pub fn new(registry: CounterpartRegistry, formatter: Arc<dyn RelayFormatter>) -> Self {
        Self {
            registry,
            formatter,
        }
    }

    pub fn registry(&self) -> &CounterpartRegistry {
        &self.registry
    }

    pub fn register_counterpart(&self, counterpart: Arc<dyn RelayCounterpart>) {
        self.registry.register(counterpart);
    }

    /// Hand one event to the counterpart
    pub async fn deliver(&self, event: RelayEvent) {
        let Some(counterpart) = self.registry.get() else {
            tracing::warn!("Dropping IRC event, no bridge registered: {:?}", event);
            return;
        };

        match event {
            RelayEvent::PrivateMessage { text, raw, .. } => {
                counterpart.handle_direct_message(text, raw).await;
            }
            RelayEvent::PublicMessage(fields) => {
                counterpart.handle_public_message(fields).await;
            }
            RelayEvent::ModeChange(change) => {
                let notice = self.formatter.format_ban_notice(&change);
                counterpart.handle_public_message(notice).await;
            }
            RelayEvent::ChannelParted { channel } => {
                counterpart.handle_channel_parted(channel).await;
            }
            RelayEvent::Welcome { nickname } => {
                counterpart.handle_ready(nickname).await;
            }
        }
    }

    /// Drain the inbound queue until the connection side goes away
    ///
    /// Each delivery runs as its own task and is awaited before the next, so
    /// order is kept and a panicking handler costs only its own event.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<RelayEvent>) {
        while let Some(event) = events.recv().await {
            let dispatcher = self.clone();
            let delivery = tokio::spawn(async move { dispatcher.deliver(event).await });
            if let Err(e) = delivery.await {
                tracing::warn!("IRC event handler failed: {}", e);
            }
        }
        tracing::debug!("IRC event queue closed");
    }

    /// Run the pump on the current runtime
    pub fn spawn(self, events: mpsc::UnboundedReceiver<RelayEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}

/// Completion channel attached to a command
pub type Reply = oneshot::Sender<Result<()>>;

/// Requests executed on the connection thread
#[derive(Debug)]
pub enum Command {
    Send {
        message: OutboundMessage,
        reply: Reply,
    },
    Join {
        channel: String,
        reply: Reply,
    },
    Mode {
        channel: String,
        action: ModeAction,
        target: String,
        reply: Reply,
    },
    /// Graceful stop: QUIT, cancel timers, leave the loop
    Shutdown { reason: Option<String> },
}

/// Eventual result of a command; dropping it is fine
#[derive(Debug)]
pub struct Pending {
    receiver: oneshot::Receiver<Result<()>>,
}

impl Pending {
    /// Wait for the connection thread to finish the command
    pub async fn outcome(self) -> Result<()> {
        self.receiver
            .await
            .map_err(|_| Error::Dispatch("connection thread dropped the request".to_string()))?
    }
}

/// Cloneable handle the application uses to reach the connection thread
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<RelaySnapshot>,
    formatter: Arc<dyn RelayFormatter>,
}

impl RelayHandle {
    pub fn new(
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<RelaySnapshot>,
        formatter: Arc<dyn RelayFormatter>,
    ) -> Self {
        Self {
            commands,
            snapshot,
            formatter,
        }
    }

    fn submit(&self, build: impl FnOnce(Reply) -> Command) -> Result<Pending> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| Error::Dispatch("connection thread has stopped".to_string()))?;
        Ok(Pending { receiver })
    }

    /// Relay a message into its IRC channel
    pub fn send_message(&self, message: OutboundMessage) -> Result<Pending> {
        self.submit(|reply| Command::Send { message, reply })
    }

    /// Announce an edit in the channel
    pub fn send_edit(&self, channel: &str, author: &str, content: &str) -> Result<Pending> {
        let text = self.formatter.format_edit(author, content);
        self.send_message(OutboundMessage::new(channel, content).with_override(text))
    }

    /// Announce a reaction in the channel
    pub fn send_reaction(
        &self,
        channel: &str,
        user: &str,
        reaction: &str,
        content: &str,
    ) -> Result<Pending> {
        let text = self.formatter.format_reaction(user, reaction, content);
        self.send_message(OutboundMessage::new(channel, content).with_override(text))
    }

    pub fn request_join(&self, channel: &str) -> Result<Pending> {
        let channel = channel.to_string();
        self.submit(|reply| Command::Join { channel, reply })
    }

    /// Ban or unban `identity` (a hostmask) on `channel`
    pub fn ban_or_unban(&self, identity: &str, channel: &str, action: ModeAction) -> Result<Pending> {
        let (channel, target) = (channel.to_string(), identity.to_string());
        self.submit(|reply| Command::Mode {
            channel,
            action,
            target,
            reply,
        })
    }

    /// Whether the relay holds channel operator status, from cached state
    pub fn is_operator(&self, channel: &str) -> bool {
        let snapshot = self.snapshot.borrow();
        snapshot.roster.is_operator(channel, &snapshot.nickname)
    }

    /// Latest published connection state
    pub fn snapshot(&self) -> RelaySnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel for snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<RelaySnapshot> {
        self.snapshot.clone()
    }

    /// Ask the connection thread to QUIT and stop
    pub fn shutdown(&self, reason: Option<&str>) -> Result<()> {
        self.commands
            .send(Command::Shutdown {
                reason: reason.map(str::to_string),
            })
            .map_err(|_| Error::Dispatch("connection thread has stopped".to_string()))
    }
}

/// Abrupt process termination
///
/// **This is not a graceful stop.** [`FatalShutdown::trigger`] ends the whole
/// process on the spot: the rejoin timer, open sockets, queued commands and
/// events still in flight are all abandoned without cleanup, and no QUIT is
/// sent. Use [`RelayHandle::shutdown`] for an orderly stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalShutdown {
    pub exit_code: i32,
}

impl Default for FatalShutdown {
    fn default() -> Self {
        Self { exit_code: 1 }
    }
}

impl FatalShutdown {
    pub fn trigger(self) -> ! {
        tracing::error!("Fatal shutdown requested, exiting with code {}", self.exit_code);
        std::process::exit(self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PlainFormatter;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelayCounterpart for Recorder {
        async fn handle_direct_message(&self, text: String, _raw: Message) {
            self.seen.lock().push(format!("dm:{}", text));
        }

        async fn handle_public_message(&self, fields: PublicMessage) {
            self.seen.lock().push(format!("{}:{}", fields.channel, fields.text));
        }
    }

    fn public(n: usize) -> RelayEvent {
        RelayEvent::PublicMessage(PublicMessage {
            channel: "#c".to_string(),
            sender: "a".to_string(),
            hostmask: "a!a@a".to_string(),
            text: n.to_string(),
        })
    }

    #[tokio::test]
    async fn test_pump_preserves_order() {
        let registry = CounterpartRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(recorder.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        for n in 0..50 {
            sink.submit(public(n));
        }
        drop(sink);

        Dispatcher::new(registry, Arc::new(PlainFormatter)).run(rx).await;
        let expected: Vec<String> = (0..50).map(|n| format!("#c:{}", n)).collect();
        assert_eq!(*recorder.seen.lock(), expected);
    }

    /// Panics on private messages, records everything else
    #[derive(Default)]
    struct Fragile {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelayCounterpart for Fragile {
        async fn handle_direct_message(&self, _text: String, _raw: Message) {
            panic!("handler bug");
        }

        async fn handle_public_message(&self, fields: PublicMessage) {
            self.seen.lock().push(format!("{}:{}", fields.channel, fields.text));
        }
    }

    #[tokio::test]
    async fn test_pump_survives_panicking_handler() {
        let registry = CounterpartRegistry::new();
        let fragile = Arc::new(Fragile::default());
        registry.register(fragile.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.submit(public(1));
        sink.submit(RelayEvent::PrivateMessage {
            sender: "alice".to_string(),
            text: "boom".to_string(),
            raw: Message::parse(":alice!a@h PRIVMSG relay :boom").unwrap(),
        });
        sink.submit(public(2));
        drop(sink);

        Dispatcher::new(registry, Arc::new(PlainFormatter)).run(rx).await;
        assert_eq!(*fragile.seen.lock(), vec!["#c:1".to_string(), "#c:2".to_string()]);
    }

    #[tokio::test]
    async fn test_events_without_counterpart_are_dropped() {
        let registry = CounterpartRegistry::new();
        assert!(!registry.is_registered());
        let dispatcher = Dispatcher::new(registry, Arc::new(PlainFormatter));
        dispatcher.deliver(public(1)).await;
    }

    #[tokio::test]
    async fn test_mode_change_becomes_notice() {
        let dispatcher = Dispatcher::new(CounterpartRegistry::new(), Arc::new(PlainFormatter));
        let recorder = Arc::new(Recorder::default());
        dispatcher.register_counterpart(recorder.clone());
        assert!(dispatcher.registry().is_registered());

        let msg = Message::parse(":op!o@h MODE #c -b x!*@*").unwrap();
        let change = crate::moderation::parse_mode_change(&msg).unwrap();
        dispatcher.deliver(RelayEvent::ModeChange(change)).await;
        assert_eq!(*recorder.seen.lock(), vec!["#c:op unbanned x!*@*".to_string()]);
    }

    #[test]
    fn test_handle_enqueues_without_blocking() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_snap_tx, snap_rx) = watch::channel(RelaySnapshot::new("relay"));
        let handle = RelayHandle::new(tx, snap_rx, Arc::new(PlainFormatter));

        let _pending = handle.ban_or_unban("n!u@h", "#c", ModeAction::Ban).unwrap();
        match rx.try_recv().unwrap() {
            Command::Mode { channel, action, target, .. } => {
                assert_eq!(channel, "#c");
                assert_eq!(action, ModeAction::Ban);
                assert_eq!(target, "n!u@h");
            }
            other => panic!("unexpected command {:?}", other),
        }

        let _pending = handle.send_edit("#c", "bob", "fixed typo").unwrap();
        match rx.try_recv().unwrap() {
            Command::Send { message, .. } => {
                assert_eq!(message.content_override.as_deref(), Some("\x02bob\x02 edited: fixed typo"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        drop(rx);
        assert!(matches!(handle.request_join("#c"), Err(Error::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_pending_reports_dropped_request() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_snap_tx, snap_rx) = watch::channel(RelaySnapshot::new("relay"));
        let handle = RelayHandle::new(tx, snap_rx, Arc::new(PlainFormatter));
        let pending = handle.request_join("#c").unwrap();
        drop(rx);
        assert!(matches!(pending.outcome().await, Err(Error::Dispatch(_))));
    }
}
