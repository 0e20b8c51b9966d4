//! Server configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{load_file, validate_addr, DEFAULT_BANDWIDTH, DEFAULT_KEY};
use crate::crypto::TunnelKey;
use crate::error::Result;

/// Server configuration.
///
/// `encrypt` and `key` must match the clients'; see [`crate::config`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address accepting tunnel carriers
    pub listen_addr: String,
    /// Where every forwarded connection is sent
    pub target_addr: String,
    /// Passphrase the tunnel key is derived from
    pub key: String,
    /// Bandwidth hint in Mbit/s
    pub bandwidth: u32,
    /// Expect encrypted carriers
    pub encrypt: bool,
    /// Bound on waiting for a client's IV; unset waits indefinitely
    pub handshake_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ":29900".into(),
            target_addr: "127.0.0.1:12948".into(),
            key: DEFAULT_KEY.into(),
            bandwidth: DEFAULT_BANDWIDTH,
            encrypt: false,
            handshake_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    /// Tunnel key, when encryption is enabled.
    pub fn tunnel_key(&self) -> Option<TunnelKey> {
        self.encrypt.then(|| TunnelKey::from_passphrase(&self.key))
    }

    /// Handshake timeout, if configured.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        validate_addr("listen_addr", &self.listen_addr)?;
        validate_addr("target_addr", &self.target_addr)?;
        if self.encrypt && self.key.is_empty() {
            return Err("key cannot be empty when encryption is enabled".into());
        }
        if self.bandwidth == 0 {
            return Err("bandwidth must be at least 1 Mbit/s".into());
        }
        if self.handshake_timeout_secs == Some(0) {
            return Err("handshake_timeout_secs must be positive when set".into());
        }
        Ok(())
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("target_addr", &self.target_addr)
            .field("key", &"<redacted>")
            .field("bandwidth", &self.bandwidth)
            .field("encrypt", &self.encrypt)
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .finish()
    }
}
