//! Reconnection backoff

use crate::config::TimingConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Reconnection state for automatic reconnection
#[derive(Debug, Clone)]
pub struct ReconnectionState {
    /// Number of reconnection attempts since the last welcome
    pub attempts: u32,
    /// Time of last disconnect
    pub last_disconnect_time: Option<DateTime<Utc>>,
    /// Time of last reconnection attempt
    pub last_attempt_time: Option<DateTime<Utc>>,
    base_delay: u64,
    max_delay: u64,
}

impl ReconnectionState {
    /// Create a new reconnection state
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            attempts: 0,
            last_disconnect_time: None,
            last_attempt_time: None,
            base_delay: timing.reconnect_base_delay_secs,
            max_delay: timing.reconnect_max_delay_secs,
        }
    }

    /// Delay before the next attempt: base * 2^attempts, capped at the maximum
    pub fn next_delay(&self) -> Duration {
        // Cap power at 10 to prevent overflow
        let delay = self.base_delay.saturating_mul(2_u64.pow(self.attempts.min(10)));
        Duration::from_secs(delay.min(self.max_delay))
    }

    pub fn record_disconnect(&mut self) {
        self.last_disconnect_time = Some(Utc::now());
    }

    /// Record a reconnection attempt
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempt_time = Some(Utc::now());
    }

    /// Reset reconnection state after successful registration
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let timing = TimingConfig {
            reconnect_base_delay_secs: 5,
            reconnect_max_delay_secs: 60,
            ..TimingConfig::default()
        };
        let mut state = ReconnectionState::new(&timing);

        let delays: Vec<u64> = (0..6)
            .map(|_| {
                let delay = state.next_delay().as_secs();
                state.record_attempt();
                delay
            })
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);

        state.reset();
        assert_eq!(state.next_delay(), Duration::from_secs(5));
        assert!(state.last_attempt_time.is_none());
    }

    #[test]
    fn test_zero_base_reconnects_immediately() {
        let timing = TimingConfig {
            reconnect_base_delay_secs: 0,
            ..TimingConfig::default()
        };
        let mut state = ReconnectionState::new(&timing);
        state.record_attempt();
        state.record_attempt();
        assert_eq!(state.next_delay(), Duration::ZERO);
    }
}
