//! Error types for the IRC relay

use thiserror::Error;

/// Main error type for the IRC relay
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message parsing error: {0}")]
    MessageParse(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// A send or mode change was attempted outside the `Ready` state
    #[error("Not connected to IRC")]
    NotConnected,

    /// Every derived nickname was rejected by the network
    #[error("Nickname rejected after {attempts} attempts (last tried {last})")]
    NicknameExhausted { attempts: u32, last: String },

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// The other side of a cross-runtime queue has gone away
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Generic(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}
