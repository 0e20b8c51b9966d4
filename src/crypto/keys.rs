//! Shared tunnel key.
//!
//! Both ends hold the same passphrase; it is reduced once at startup with
//! SHA-256 to a fixed-length AES-256 key.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_SIZE;

/// Symmetric key shared by client and server.
///
/// Automatically zeroized when dropped. `Debug` never prints key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct TunnelKey([u8; KEY_SIZE]);

impl TunnelKey {
    /// Derive the key from a passphrase (SHA-256 of its UTF-8 bytes).
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self(key)
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short, non-reversible identifier for logs.
    ///
    /// Lets operators check that both ends use the same passphrase.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for TunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TunnelKey({})", self.fingerprint())
    }
}
