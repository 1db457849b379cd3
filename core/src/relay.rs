//! Relay launcher
//!
//! Puts the connection manager on a dedicated OS thread with its own
//! single-threaded runtime and wires the two dispatch queues between that
//! thread and the caller's runtime.

use crate::config::RelayConfig;
use crate::dispatch::{CounterpartRegistry, Dispatcher, EventSink, RelayCounterpart, RelayHandle};
use crate::format::RelayFormatter;
use crate::manager::ConnectionManager;
use crate::status::StatusReporter;
use crate::transport::Transport;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Name of the connection thread, visible in logs
pub const RELAY_THREAD_NAME: &str = "irc-relay";

/// A running relay
pub struct Relay {
    handle: RelayHandle,
    status: StatusReporter,
    registry: CounterpartRegistry,
    pump: JoinHandle<()>,
    thread: std::thread::JoinHandle<()>,
}

impl Relay {
    /// Start the connection thread and the event pump
    ///
    /// Must be called from within the application's tokio runtime, which is
    /// where inbound events are delivered; fails with [`Error::Dispatch`]
    /// otherwise.
    pub fn spawn<T>(config: RelayConfig, transport: T, formatter: Arc<dyn RelayFormatter>) -> Result<Self>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        let application = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Dispatch("the relay must be started from within a tokio runtime".to_string())
        })?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let name = config.identity.nickname.clone();
        let manager = ConnectionManager::new(config, transport, EventSink::new(event_tx), formatter.clone());
        let snapshot = manager.subscribe();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let thread = std::thread::Builder::new()
            .name(RELAY_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(manager.run(command_rx)))?;

        let registry = CounterpartRegistry::new();
        let pump = application.spawn(Dispatcher::new(registry.clone(), formatter.clone()).run(event_rx));

        Ok(Self {
            handle: RelayHandle::new(command_tx, snapshot.clone(), formatter),
            status: StatusReporter::new(snapshot, registry.clone(), name),
            registry,
            pump,
            thread,
        })
    }

    /// Handle for sending to IRC; cheap to clone
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    /// Register the application side that receives IRC traffic
    pub fn register_counterpart(&self, counterpart: Arc<dyn RelayCounterpart>) {
        self.registry.register(counterpart);
    }

    /// Graceful stop: QUIT, wait for the connection thread, drain the pump
    pub async fn stop(self, reason: Option<&str>) -> Result<()> {
        // Already stopped is fine
        let _ = self.handle.shutdown(reason);

        let thread = self.thread;
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| Error::Dispatch(format!("join failed: {}", e)))?
            .map_err(|_| Error::Dispatch("connection thread panicked".to_string()))?;

        self.pump
            .await
            .map_err(|e| Error::Dispatch(format!("event pump failed: {}", e)))
    }
}
