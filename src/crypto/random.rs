//! Random sources.
//!
//! IV generation goes through the [`IvSource`] trait so the client can be
//! handed a deterministic generator under test and the OS entropy source in
//! production.

use parking_lot::Mutex;
use rand::{CryptoRng, RngCore};
use rand_core::OsRng;

use crate::crypto::BLOCK_SIZE;

/// Supplies one fresh IV per carrier connection.
pub trait IvSource: Send + Sync {
    /// Produce a new block-sized IV.
    fn next_iv(&self) -> [u8; BLOCK_SIZE];
}

/// [`IvSource`] backed by any cryptographically secure RNG.
pub struct RngIvSource<R> {
    rng: Mutex<R>,
}

impl<R> RngIvSource<R>
where
    R: RngCore + CryptoRng + Send,
{
    /// Wrap `rng`.
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl<R> IvSource for RngIvSource<R>
where
    R: RngCore + CryptoRng + Send,
{
    fn next_iv(&self) -> [u8; BLOCK_SIZE] {
        let mut iv = [0u8; BLOCK_SIZE];
        self.rng.lock().fill_bytes(&mut iv);
        iv
    }
}

/// Production IV source reading from the OS entropy source (e.g.
/// /dev/urandom on Unix, BCryptGenRandom on Windows).
pub type OsIvSource = RngIvSource<OsRng>;

impl Default for OsIvSource {
    fn default() -> Self {
        Self::new(OsRng)
    }
}
