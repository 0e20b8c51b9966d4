//! Encrypted carrier wrapper.
//!
//! [`SecureStream`] sits between the multiplexer and the carrier and applies
//! AES-256-CFB independently in each direction.
//!
//! Writes encrypt the caller's whole buffer exactly once into a pending
//! ciphertext buffer, which is drained to the carrier before the next write is
//! accepted and before flush or shutdown complete. A short write on the
//! carrier therefore never re-encrypts or drops ciphertext. Reads decrypt
//! exactly the bytes the carrier delivered, so short reads keep the keystream
//! aligned.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::crypto::{cipher_pair, Decryptor, Encryptor, TunnelKey};
use crate::error::Result;

/// A carrier with per-direction stream encryption.
pub struct SecureStream<T> {
    inner: T,
    encryptor: Encryptor,
    decryptor: Decryptor,
    /// Ciphertext not yet accepted by the carrier
    pending: Vec<u8>,
    /// How much of `pending` the carrier has taken
    written: usize,
}

impl<T> SecureStream<T> {
    /// Wrap `carrier` using `key` and the connection's IV.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Crypto`] if the cipher cannot be built; no
    /// partially initialised stream is ever returned.
    pub fn new(key: &TunnelKey, carrier: T, iv: &[u8]) -> Result<Self> {
        let (encryptor, decryptor) = cipher_pair(key, iv)?;
        Ok(Self {
            inner: carrier,
            encryptor,
            decryptor,
            pending: Vec::new(),
            written: 0,
        })
    }

    /// Get a reference to the carrier.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Plaintext bytes accepted for writing so far.
    pub fn bytes_encrypted(&self) -> u64 {
        self.encryptor.processed()
    }

    /// Plaintext bytes delivered to readers so far.
    pub fn bytes_decrypted(&self) -> u64 {
        self.decryptor.processed()
    }
}

impl<T: AsyncWrite + Unpin> SecureStream<T> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.written < self.pending.len() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.written..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "carrier accepted zero bytes",
                )));
            }
            self.written += n;
        }
        self.pending.clear();
        self.written = 0;
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for SecureStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        this.decryptor.apply(&mut buf.filled_mut()[before..]);
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for SecureStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        // Previous ciphertext must be fully out before new plaintext is taken.
        ready!(this.poll_drain(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        this.pending.extend_from_slice(buf);
        this.encryptor.apply(&mut this.pending);
        this.written = 0;

        if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Encryptor, BLOCK_SIZE};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Carrier that accepts at most `limit` bytes per write call.
    struct Trickle {
        inner: DuplexStream,
        limit: usize,
        sends: Vec<usize>,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let limit = self.limit.min(buf.len());
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &buf[..limit]))?;
            self.sends.push(n);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    /// Carrier whose writes never make progress.
    struct Stalled {
        error: Option<io::ErrorKind>,
    }

    impl AsyncWrite for Stalled {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            match self.error {
                Some(kind) => Poll::Ready(Err(io::Error::new(kind, "carrier gone"))),
                None => Poll::Ready(Ok(0)),
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn key() -> TunnelKey {
        TunnelKey::from_passphrase("secret")
    }

    #[tokio::test]
    async fn test_hello_world_split_writes_small_reads() {
        let iv = [3u8; BLOCK_SIZE];
        let (a, b) = duplex(1024);

        let mut writer = SecureStream::new(&key(), a, &iv).unwrap();
        let mut reader = SecureStream::new(&key(), b, &iv).unwrap();

        writer.write_all(b"hello").await.unwrap();
        writer.write_all(b" world").await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.bytes_encrypted(), 11);

        let mut out = Vec::new();
        let mut chunk = [0u8; 3];
        while out.len() < 11 {
            let n = reader.read(&mut chunk).await.unwrap();
            assert!(n > 0 && n <= 3);
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, b"hello world");
        assert_eq!(reader.bytes_decrypted(), 11);
    }

    #[tokio::test]
    async fn test_short_carrier_writes_encrypt_once() {
        let iv = [9u8; BLOCK_SIZE];
        let (a, mut b) = duplex(1024);
        let trickle = Trickle {
            inner: a,
            limit: 4,
            sends: Vec::new(),
        };

        let mut writer = SecureStream::new(&key(), trickle, &iv).unwrap();
        let n = writer.write(b"hello world").await.unwrap();
        assert_eq!(n, 11);
        writer.flush().await.unwrap();

        // Three carrier sends, one encryption pass.
        assert_eq!(writer.get_ref().sends, vec![4, 4, 3]);
        assert_eq!(writer.bytes_encrypted(), 11);

        let mut wire = [0u8; 11];
        b.read_exact(&mut wire).await.unwrap();

        let mut expected = *b"hello world";
        Encryptor::new(&key(), &iv).unwrap().apply(&mut expected);
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn test_random_chunking_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for round in 0..20 {
            let len = rng.gen_range(1..20_000);
            let plaintext: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let iv: [u8; BLOCK_SIZE] = rng.gen();
            let write_seed: u64 = rng.gen();
            let read_seed: u64 = rng.gen();

            // Tiny pipe capacity forces partial carrier writes and reads.
            let (a, b) = duplex(rng.gen_range(1..64));
            let mut writer = SecureStream::new(&key(), a, &iv).unwrap();
            let mut reader = SecureStream::new(&key(), b, &iv).unwrap();

            let expected = plaintext.clone();
            let send = tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(write_seed);
                let mut rest = &plaintext[..];
                while !rest.is_empty() {
                    let n = rng.gen_range(1..=rest.len().min(777));
                    writer.write_all(&rest[..n]).await.unwrap();
                    rest = &rest[n..];
                }
                writer.shutdown().await.unwrap();
            });

            let mut rng = StdRng::seed_from_u64(read_seed);
            let mut out = Vec::with_capacity(len);
            loop {
                let mut buf = vec![0u8; rng.gen_range(1..300)];
                let n = reader.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            send.await.unwrap();

            assert_eq!(out, expected, "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_bidirectional_independent_keystreams() {
        let iv = [5u8; BLOCK_SIZE];
        let (a, b) = duplex(256);
        let mut client = SecureStream::new(&key(), a, &iv).unwrap();
        let mut server = SecureStream::new(&key(), b, &iv).unwrap();

        client.write_all(b"request").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 7];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        server.write_all(b"response!").await.unwrap();
        server.flush().await.unwrap();
        let mut buf = [0u8; 9];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response!");

        assert_eq!(client.bytes_encrypted(), 7);
        assert_eq!(client.bytes_decrypted(), 9);
    }

    #[tokio::test]
    async fn test_wrong_key_garbles() {
        let iv = [5u8; BLOCK_SIZE];
        let (a, b) = duplex(256);
        let mut writer = SecureStream::new(&key(), a, &iv).unwrap();
        let mut reader =
            SecureStream::new(&TunnelKey::from_passphrase("other"), b, &iv).unwrap();

        writer.write_all(b"attack at dawn").await.unwrap();
        writer.flush().await.unwrap();
        let mut buf = [0u8; 14];
        reader.read_exact(&mut buf).await.unwrap();
        assert_ne!(&buf, b"attack at dawn");
    }

    #[tokio::test]
    async fn test_zero_length_carrier_write_fails_stream() {
        let iv = [1u8; BLOCK_SIZE];
        let mut writer = SecureStream::new(&key(), Stalled { error: None }, &iv).unwrap();

        let err = writer.write_all(b"hello").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(writer.bytes_encrypted(), 5);

        // The ciphertext is still pending, so flush fails the same way
        // without encrypting anything again.
        let err = writer.flush().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(writer.bytes_encrypted(), 5);
    }

    #[tokio::test]
    async fn test_carrier_write_error_fails_stream() {
        let iv = [1u8; BLOCK_SIZE];
        let carrier = Stalled {
            error: Some(io::ErrorKind::BrokenPipe),
        };
        let mut writer = SecureStream::new(&key(), carrier, &iv).unwrap();

        let err = writer.write_all(b"hello world").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(writer.bytes_encrypted(), 11);

        let err = writer.write_all(b"more").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = writer.shutdown().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(writer.bytes_encrypted(), 11);
    }

    #[test]
    fn test_bad_iv_is_rejected() {
        let (a, _b) = duplex(16);
        assert!(SecureStream::new(&key(), a, &[0u8; 4]).is_err());
    }
}
