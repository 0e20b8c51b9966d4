//! Initialization-vector handshake.
//!
//! When encryption is enabled, the first [`IV_SIZE`] bytes of every carrier
//! are the client's IV, in cleartext. Nothing else is exchanged and nothing
//! is negotiated: both ends must agree out of band on whether encryption is
//! on. A client and server that disagree will not interoperate and the
//! mismatch is not detected on the wire.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{IvSource, BLOCK_SIZE};
use crate::error::{Error, Result};

/// IV length: one AES block.
pub const IV_SIZE: usize = BLOCK_SIZE;

/// Per-carrier initialization vector.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for Iv {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", hex::encode(self.0))
    }
}

impl fmt::Display for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Client side: generate a fresh IV and send it as the carrier's first bytes.
pub async fn send_iv<W>(carrier: &mut W, source: &dyn IvSource) -> Result<Iv>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let iv = Iv(source.next_iv());
    carrier
        .write_all(&iv.0)
        .await
        .map_err(|e| Error::handshake(format!("sending IV: {}", e)))?;
    carrier
        .flush()
        .await
        .map_err(|e| Error::handshake(format!("flushing IV: {}", e)))?;
    Ok(iv)
}

/// Server side: read exactly one IV from a freshly accepted carrier.
///
/// Short reads are retried until the block is complete; EOF first is an error.
pub async fn receive_iv<R>(carrier: &mut R) -> Result<Iv>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut iv = [0u8; IV_SIZE];
    let mut filled = 0;

    while filled < IV_SIZE {
        let n = carrier
            .read(&mut iv[filled..])
            .await
            .map_err(|e| Error::handshake(format!("reading IV: {}", e)))?;
        if n == 0 {
            return Err(Error::handshake(format!(
                "carrier closed after {} of {} IV bytes",
                filled, IV_SIZE
            )));
        }
        filled += n;
    }

    Ok(Iv(iv))
}

/// [`receive_iv`] bounded by `limit`, when one is configured.
pub async fn receive_iv_within<R>(carrier: &mut R, limit: Option<Duration>) -> Result<Iv>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, receive_iv(carrier))
            .await
            .map_err(|_| Error::Timeout(limit.as_millis() as u64))?,
        None => receive_iv(carrier).await,
    }
}
