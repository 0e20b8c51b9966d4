//! Shared configuration helpers.
//!
//! Both ends are configured from an optional TOML file whose missing keys fall
//! back to built-in defaults; command-line flags are applied on top by the
//! binaries.
//!
//! Encryption is not negotiated. The client and server must be configured
//! with the same `encrypt` setting and the same `key`; a mismatch is not
//! detected and the tunnel simply fails to carry traffic.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Passphrase used when none is configured.
pub const DEFAULT_KEY: &str = "it's a secrect";

/// Bandwidth hint used when none is configured, in Mbit/s.
pub const DEFAULT_BANDWIDTH: u32 = crate::transport::DEFAULT_BANDWIDTH_MBPS;

/// Parse a TOML document into a config struct.
pub fn from_toml_str<T: DeserializeOwned>(text: &str) -> Result<T> {
    toml::from_str(text).map_err(|e| Error::config(format!("invalid TOML: {}", e)))
}

/// Read and parse a TOML config file.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("reading {}: {}", path.display(), e)))?;
    from_toml_str(&text)
}

/// Check that `addr` looks like `host:port` or `:port`.
pub(crate) fn validate_addr(field: &str, addr: &str) -> std::result::Result<(), String> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(format!("{} must be host:port, got {:?}", field, addr));
    };
    if port.parse::<u16>().is_err() {
        return Err(format!("{} has an invalid port: {:?}", field, addr));
    }
    if host.contains(char::is_whitespace) {
        return Err(format!("{} has an invalid host: {:?}", field, addr));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_addr() {
        assert!(validate_addr("a", ":12948").is_ok());
        assert!(validate_addr("a", "vps:29900").is_ok());
        assert!(validate_addr("a", "[::1]:80").is_ok());
        assert!(validate_addr("a", "no-port").is_err());
        assert!(validate_addr("a", "host:http").is_err());
        assert!(validate_addr("a", "host:70000").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_file::<toml::Value>(Path::new("/nonexistent/muxtun.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
