//! Configuration management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Channels the relay keeps itself joined to
    pub channels: Vec<String>,
    /// IRC server to connect to
    pub server: ServerConfig,
    /// Identity and credentials
    pub identity: IdentityConfig,
    /// Timers and rate limits
    pub timing: TimingConfig,
    /// Nickname collision policy
    pub nick: NickConfig,
}

/// IRC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Whether to use TLS
    pub tls: bool,
    /// Server password, also used for SASL when enabled
    pub password: Option<String>,
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Nickname to register with
    pub nickname: String,
    /// Username (ident), also the SASL account name
    pub username: String,
    /// Real name
    pub realname: String,
    /// Authenticate with SASL PLAIN before registration completes
    pub sasl: bool,
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds between membership watchdog firings
    pub rejoin_interval_secs: u64,
    /// First reconnection delay in seconds
    pub reconnect_base_delay_secs: u64,
    /// Upper bound for the reconnection delay in seconds
    pub reconnect_max_delay_secs: u64,
    /// Minimum milliseconds between outbound lines
    pub message_interval_ms: u64,
}

/// Nickname collision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NickConfig {
    /// Character appended to the nickname on each collision
    pub collision_suffix: char,
    /// Give up after this many collisions; retries forever when unset
    pub max_attempts: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "irc.libera.chat".to_string(),
            port: 6697,
            tls: true,
            password: None,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nickname: "ircrelay".to_string(),
            username: "ircrelay".to_string(),
            realname: "ircrelay".to_string(),
            sasl: false,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rejoin_interval_secs: 600,
            reconnect_base_delay_secs: 5,
            reconnect_max_delay_secs: 300,
            message_interval_ms: 1000,
        }
    }
}

impl Default for NickConfig {
    fn default() -> Self {
        Self {
            collision_suffix: '_',
            max_attempts: None,
        }
    }
}

impl TimingConfig {
    pub fn rejoin_interval(&self) -> Duration {
        Duration::from_secs(self.rejoin_interval_secs)
    }

    pub fn message_interval(&self) -> Duration {
        Duration::from_millis(self.message_interval_ms)
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: RelayConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Write configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::Config("Server host cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(Error::Config("Port cannot be 0".to_string()));
        }

        if self.identity.nickname.is_empty() || self.identity.nickname.contains(' ') {
            return Err(Error::Config(format!(
                "Invalid nickname '{}'",
                self.identity.nickname
            )));
        }

        if self.identity.username.is_empty() {
            return Err(Error::Config("Username cannot be empty".to_string()));
        }

        if self.identity.sasl && self.server.password.is_none() {
            return Err(Error::Config("SASL enabled but no password configured".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for channel in &self.channels {
            if !channel.starts_with('#') && !channel.starts_with('&') {
                return Err(Error::Config(format!("Invalid channel name '{}'", channel)));
            }
            if channel.contains([' ', ',', '\x07']) {
                return Err(Error::Config(format!("Invalid channel name '{}'", channel)));
            }
            if !seen.insert(channel.to_lowercase()) {
                return Err(Error::Config(format!("Duplicate channel {} in configuration", channel)));
            }
        }

        if self.timing.rejoin_interval_secs == 0 {
            return Err(Error::Config("Rejoin interval must be greater than 0".to_string()));
        }

        if self.timing.reconnect_max_delay_secs < self.timing.reconnect_base_delay_secs {
            return Err(Error::Config(
                "Maximum reconnect delay cannot be below the base delay".to_string(),
            ));
        }

        if self.nick.collision_suffix.is_whitespace() {
            return Err(Error::Config("Nickname suffix cannot be whitespace".to_string()));
        }

        if self.nick.max_attempts == Some(0) {
            return Err(Error::Config("Nickname attempts must be greater than 0".to_string()));
        }

        Ok(())
    }
}
