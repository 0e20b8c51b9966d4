//! AES-256-CFB direction instances.
//!
//! A secured carrier keeps one [`Encryptor`] for bytes it writes and one
//! [`Decryptor`] for bytes it reads. Both start from the same key and IV but
//! never share state: each keystream position only moves by the bytes its own
//! direction processed, in order. Full-block CFB is self-synchronising per
//! block, so calls may split the stream at any byte boundary.

use aes::Aes256;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};

use crate::crypto::{TunnelKey, BLOCK_SIZE};
use crate::error::{Error, Result};

/// Encrypting half of a secured carrier.
pub struct Encryptor {
    inner: BufEncryptor<Aes256>,
    processed: u64,
}

impl Encryptor {
    /// Build an encryptor for `key` and `iv`.
    ///
    /// Fails if `iv` is not exactly one block long.
    pub fn new(key: &TunnelKey, iv: &[u8]) -> Result<Self> {
        let inner = BufEncryptor::<Aes256>::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| invalid_iv(iv.len()))?;
        Ok(Self {
            inner,
            processed: 0,
        })
    }

    /// Encrypt `data` in place, advancing the keystream by `data.len()`.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.encrypt(data);
        self.processed += data.len() as u64;
    }

    /// Total bytes encrypted so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

/// Decrypting half of a secured carrier.
pub struct Decryptor {
    inner: BufDecryptor<Aes256>,
    processed: u64,
}

impl Decryptor {
    /// Build a decryptor for `key` and `iv`.
    pub fn new(key: &TunnelKey, iv: &[u8]) -> Result<Self> {
        let inner = BufDecryptor::<Aes256>::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| invalid_iv(iv.len()))?;
        Ok(Self {
            inner,
            processed: 0,
        })
    }

    /// Decrypt `data` in place, advancing the keystream by `data.len()`.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.decrypt(data);
        self.processed += data.len() as u64;
    }

    /// Total bytes decrypted so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

/// Build both direction instances for one carrier.
pub fn cipher_pair(key: &TunnelKey, iv: &[u8]) -> Result<(Encryptor, Decryptor)> {
    Ok((Encryptor::new(key, iv)?, Decryptor::new(key, iv)?))
}

fn invalid_iv(len: usize) -> Error {
    Error::crypto(format!("IV must be {} bytes, got {}", BLOCK_SIZE, len))
}
