//! Cryptographic primitives for the tunnel.
//!
//! This module provides:
//! - SHA-256 reduction of the shared passphrase to an AES-256 key
//! - AES-256-CFB stream cipher instances, one per direction
//! - Injectable random sources for IV generation
//!
//! Key material is zeroized on drop.

mod cipher;
mod keys;
mod random;

pub use cipher::{cipher_pair, Decryptor, Encryptor};
pub use keys::TunnelKey;
pub use random::{IvSource, OsIvSource, RngIvSource};

/// Size of the symmetric key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// AES block size in bytes; the IV is exactly one block
pub const BLOCK_SIZE: usize = 16;
