//! Client configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{load_file, validate_addr, DEFAULT_BANDWIDTH, DEFAULT_KEY};
use crate::crypto::TunnelKey;
use crate::error::Result;

/// Client configuration.
///
/// `encrypt` and `key` must match the server's; see [`crate::config`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local address accepting connections to forward
    pub local_addr: String,
    /// Tunnel server address
    pub remote_addr: String,
    /// Passphrase the tunnel key is derived from
    pub key: String,
    /// Bandwidth hint in Mbit/s
    pub bandwidth: u32,
    /// Encrypt the carrier
    pub encrypt: bool,
    /// Pause before re-dialing after a failed reconnect dial
    pub reconnect_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_addr: ":12948".into(),
            remote_addr: "vps:29900".into(),
            key: DEFAULT_KEY.into(),
            bandwidth: DEFAULT_BANDWIDTH,
            encrypt: false,
            reconnect_delay_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    /// Tunnel key, when encryption is enabled.
    pub fn tunnel_key(&self) -> Option<TunnelKey> {
        self.encrypt.then(|| TunnelKey::from_passphrase(&self.key))
    }

    /// Reconnect dial delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        validate_addr("local_addr", &self.local_addr)?;
        validate_addr("remote_addr", &self.remote_addr)?;
        if self.encrypt && self.key.is_empty() {
            return Err("key cannot be empty when encryption is enabled".into());
        }
        if self.bandwidth == 0 {
            return Err("bandwidth must be at least 1 Mbit/s".into());
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("key", &"<redacted>")
            .field("bandwidth", &self.bandwidth)
            .field("encrypt", &self.encrypt)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_toml_str;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.local_addr, ":12948");
        assert_eq!(config.remote_addr, "vps:29900");
        assert_eq!(config.key, "it's a secrect");
        assert_eq!(config.bandwidth, 10);
        assert!(!config.encrypt);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert!(config.tunnel_key().is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: ClientConfig = from_toml_str(
            r#"
            remote_addr = "tunnel.example.com:29900"
            encrypt = true
            key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.remote_addr, "tunnel.example.com:29900");
        assert_eq!(config.local_addr, ":12948");
        assert_eq!(
            config.tunnel_key(),
            Some(TunnelKey::from_passphrase("secret"))
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<ClientConfig> = from_toml_str("bandwidth = \"fast\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig {
            remote_addr: "no-port".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.remote_addr = "127.0.0.1:29900".into();
        config.encrypt = true;
        config.key.clear();
        assert!(config.validate().is_err());

        config.key = "k".into();
        config.bandwidth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ClientConfig {
            key: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
