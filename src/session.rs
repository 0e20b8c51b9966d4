//! Multiplexed sessions over one carrier.
//!
//! A session turns one (possibly encrypted) carrier into many independent
//! logical streams. The multiplexer itself is a black box behind
//! [`Multiplexer`]; the crate ships a yamux implementation.
//!
//! Any error from [`Opener::open`] or [`Acceptor::accept`] is terminal: the
//! session and the carrier under it are finished and must be dropped. Nothing
//! in this module reconnects.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_yamux::{Config as YamuxConfig, Control, Session as YamuxSession};

use crate::error::{Error, Result};
use crate::transport::BoxedIo;

/// One multiplexed duplex stream.
pub type LogicalStream = BoxedIo;

/// Client role: creates outbound logical streams.
#[async_trait]
pub trait Opener: Send {
    /// Open a new logical stream. An error ends the session.
    async fn open(&mut self) -> Result<LogicalStream>;
}

/// Server role: yields inbound logical streams.
#[async_trait]
pub trait Acceptor: Send {
    /// Wait for the next logical stream.
    ///
    /// `Ok(None)` means the peer closed the session cleanly.
    async fn accept(&mut self) -> Result<Option<LogicalStream>>;
}

/// Builds sessions over carriers.
pub trait Multiplexer: Send + Sync {
    /// Start a client-role session on `carrier`.
    fn client(&self, carrier: BoxedIo) -> Result<Box<dyn Opener>>;

    /// Start a server-role session on `carrier`.
    fn server(&self, carrier: BoxedIo) -> Result<Box<dyn Acceptor>>;
}

/// yamux-backed [`Multiplexer`].
pub struct YamuxMultiplexer {
    config: YamuxConfig,
}

impl YamuxMultiplexer {
    /// Use a custom yamux configuration.
    pub fn new(config: YamuxConfig) -> Self {
        Self { config }
    }
}

impl Default for YamuxMultiplexer {
    fn default() -> Self {
        Self::new(YamuxConfig::default())
    }
}

impl Multiplexer for YamuxMultiplexer {
    fn client(&self, carrier: BoxedIo) -> Result<Box<dyn Opener>> {
        let mut session = YamuxSession::new_client(carrier, self.config.clone());
        let control = session.control();

        // The session only makes progress while polled. The server never
        // opens streams towards the client; an error ends the driver and the
        // next open reports it.
        let driver = tokio::spawn(async move {
            while let Some(Ok(stream)) = session.next().await {
                drop(stream);
            }
        });

        Ok(Box::new(YamuxOpener { control, driver }))
    }

    fn server(&self, carrier: BoxedIo) -> Result<Box<dyn Acceptor>> {
        let session = YamuxSession::new_server(carrier, self.config.clone());
        Ok(Box::new(YamuxAcceptor { session }))
    }
}

/// Client half of a yamux session; dropping it tears the session down.
struct YamuxOpener {
    control: Control,
    driver: JoinHandle<()>,
}

#[async_trait]
impl Opener for YamuxOpener {
    async fn open(&mut self) -> Result<LogicalStream> {
        if self.driver.is_finished() {
            return Err(Error::session("session closed"));
        }

        let stream = self
            .control
            .open_stream()
            .await
            .map_err(|e| Error::session(format!("open failed: {:?}", e)))?;
        Ok(Box::new(stream))
    }
}

impl Drop for YamuxOpener {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

struct YamuxAcceptor {
    session: YamuxSession<BoxedIo>,
}

#[async_trait]
impl Acceptor for YamuxAcceptor {
    async fn accept(&mut self) -> Result<Option<LogicalStream>> {
        match self.session.next().await {
            Some(Ok(stream)) => Ok(Some(Box::new(stream))),
            Some(Err(e)) => Err(Error::session(format!("accept failed: {}", e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn pair() -> (Box<dyn Opener>, Box<dyn Acceptor>) {
        let mux = YamuxMultiplexer::default();
        let (a, b) = duplex(64 * 1024);
        (
            mux.client(Box::new(a)).unwrap(),
            mux.server(Box::new(b)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_open_accept_exchange() {
        let (mut opener, mut acceptor) = pair();

        let server = tokio::spawn(async move {
            let mut stream = acceptor.accept().await.unwrap().unwrap();
            let echo = tokio::spawn(async move {
                let mut buf = [0u8; 5];
                stream.read_exact(&mut buf).await.unwrap();
                stream.write_all(&buf).await.unwrap();
                stream.flush().await.unwrap();
                stream
            });
            // the session only moves data while it is polled
            let _ = acceptor.accept().await;
            drop(echo.await);
        });

        let mut stream = opener.open().await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        stream.flush().await.unwrap();

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        drop(stream);
        drop(opener);
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_streams_do_not_cross() {
        let (mut opener, mut acceptor) = pair();

        let server = tokio::spawn(async move {
            while let Ok(Some(mut stream)) = acceptor.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        let mut first = opener.open().await.unwrap();
        let mut second = opener.open().await.unwrap();

        first.write_all(b"AAAA").await.unwrap();
        second.write_all(b"BBBB").await.unwrap();
        first.flush().await.unwrap();
        second.flush().await.unwrap();

        let mut buf = [0u8; 4];
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"BBBB");
        first.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AAAA");

        drop(opener);
        server.abort();
    }

    #[tokio::test]
    async fn test_open_fails_after_carrier_loss() {
        let (mut opener, acceptor) = pair();
        drop(acceptor);

        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if opener.open().await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(failed.is_ok(), "open kept succeeding on a dead carrier");
    }

    #[tokio::test]
    async fn test_accept_ends_when_client_goes_away() {
        let (opener, mut acceptor) = pair();
        drop(opener);

        let result = tokio::time::timeout(Duration::from_secs(5), acceptor.accept())
            .await
            .expect("accept did not finish");
        assert!(!matches!(result, Ok(Some(_))));
    }
}
