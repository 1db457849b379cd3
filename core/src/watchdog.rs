//! Membership watchdog
//!
//! Channel departures caused by netsplits are not always reported to the
//! client, so after every welcome the connection manager arms a periodic
//! timer that asks it to re-join its configured channels. The timer never
//! touches the connection itself: each firing is a [`RejoinTick`] sent back
//! onto the connection thread.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default watchdog period
pub const REJOIN_INTERVAL: Duration = Duration::from_secs(600);

/// One firing of the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejoinTick {
    /// Generation of the watchdog that fired; stale generations are ignored
    pub generation: u64,
    pub fired_at: DateTime<Utc>,
}

/// Handle to the single live rejoin timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct MembershipWatchdog {
    generation: u64,
    interval: Duration,
    ticks: mpsc::UnboundedSender<RejoinTick>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MembershipWatchdog {
    /// Arm a new timer; the first tick arrives one `interval` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        generation: u64,
        interval: Duration,
        ticks: mpsc::UnboundedSender<RejoinTick>,
    ) -> Self {
        let mut watchdog = Self {
            generation,
            interval,
            ticks,
            token: CancellationToken::new(),
            task: None,
        };
        watchdog.arm();
        watchdog
    }

    fn arm(&mut self) {
        let token = CancellationToken::new();
        self.token = token.clone();
        self.task = Some(tokio::spawn(Self::run(
            self.generation,
            self.interval,
            self.ticks.clone(),
            token,
        )));
    }

    async fn run(
        generation: u64,
        interval: Duration,
        ticks: mpsc::UnboundedSender<RejoinTick>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let tick = RejoinTick { generation, fired_at: Utc::now() };
                    if ticks.send(tick).is_err() {
                        break;
                    }
                }
            }
        }
        tracing::trace!("Rejoin watchdog generation {} stopped", generation);
    }

    /// Stop the timer; further calls are no-ops
    pub fn cancel(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Cancel the pending timer and arm a fresh one with a new period
    pub fn reschedule(&mut self, interval: Duration) {
        self.cancel();
        self.interval = interval;
        self.arm();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_none()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for MembershipWatchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_every_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watchdog = MembershipWatchdog::start(7, Duration::from_secs(600), tx);

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap().generation, 7);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(rx.try_recv().unwrap().generation, 7);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watchdog = MembershipWatchdog::start(1, Duration::from_secs(10), tx);
        watchdog.cancel();
        watchdog.cancel();
        assert!(watchdog.is_cancelled());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watchdog = MembershipWatchdog::start(1, Duration::from_secs(10), tx);

        tokio::time::sleep(Duration::from_secs(5)).await;
        watchdog.reschedule(Duration::from_secs(30));

        // The old 10s deadline must not fire
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(watchdog.interval(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(MembershipWatchdog::start(1, Duration::from_secs(1), tx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
