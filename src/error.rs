//! Error types for the tunnel.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a tunnel.
#[derive(Error, Debug)]
pub enum Error {
    /// Cipher could not be constructed or used
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// IV exchange failed
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Multiplexer failed to build, open or accept
    #[error("session error: {0}")]
    Session(String),

    /// Operation timed out
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::Handshake(msg.into())
    }

    /// Create a new session error
    pub fn session(msg: impl Into<String>) -> Self {
        Error::Session(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Errors that abort startup rather than a single carrier or relay.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(self, Error::Crypto(_) | Error::Config(_))
    }

    /// Errors that end one carrier's handling path.
    pub fn is_per_carrier(&self) -> bool {
        matches!(
            self,
            Error::Handshake(_) | Error::Session(_) | Error::Timeout(_)
        )
    }
}
