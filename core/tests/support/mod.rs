//! Scripted in-memory transport shared by the integration tests

#![allow(dead_code)]

use ircrelay_core::config::ServerConfig;
use async_trait::async_trait;
use ircrelay_core::{Error, Message, RelayConfig, Result, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

enum Inbound {
    Line(Message),
    Close,
}

/// Test-side controls for a [`ScriptedTransport`]
#[derive(Clone)]
pub struct Wire {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
    refuse: Arc<AtomicUsize>,
}

impl Wire {
    /// Queue a line as if the server had sent it
    pub fn push(&self, line: &str) {
        let message = Message::parse(line).expect("test line must parse");
        self.inbound.send(Inbound::Line(message)).expect("transport dropped");
    }

    /// Make the server hang up
    pub fn hang_up(&self) {
        self.inbound.send(Inbound::Close).expect("transport dropped");
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Every line written so far
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Lines written so far, clearing the log
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|l| l.starts_with(prefix))
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Transport that records writes and replays scripted server lines
pub struct ScriptedTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
    refuse: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn pair() -> (Wire, ScriptedTransport) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let opens = Arc::new(AtomicUsize::new(0));
        let refuse = Arc::new(AtomicUsize::new(0));

        let wire = Wire {
            inbound: tx,
            sent: sent.clone(),
            connected: connected.clone(),
            opens: opens.clone(),
            refuse: refuse.clone(),
        };
        let transport = ScriptedTransport {
            inbound: rx,
            sent,
            connected,
            opens,
            refuse,
        };
        (wire, transport)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self, _server: &ServerConfig) -> Result<()> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Connection("connection refused".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.sent.lock().push(message.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Message>> {
        match self.inbound.recv().await {
            Some(Inbound::Line(message)) => Some(Ok(message)),
            Some(Inbound::Close) | None => {
                self.connected.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Config with two channels and no artificial delays
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.channels = vec!["#alpha".to_string(), "#beta".to_string()];
    config.server.host = "irc.test".to_string();
    config.server.tls = false;
    config.identity.nickname = "relay".to_string();
    config.identity.username = "relay".to_string();
    config.identity.realname = "relay".to_string();
    config.timing.message_interval_ms = 0;
    config.timing.reconnect_base_delay_secs = 1;
    config.timing.reconnect_max_delay_secs = 8;
    config
}

pub const WELCOME: &str = ":irc.test 001 relay :Welcome to the test network";
