//! TCP carrier.
//!
//! The bandwidth hint has no wire meaning for TCP; it sizes the kernel socket
//! buffers so one carrier can keep a link of that speed busy.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

use crate::transport::{normalize_listen_addr, socket_buffer_size, Carrier, CarrierListener, Dialer};

const LISTEN_BACKLOG: u32 = 1024;

/// Dials a TCP address: the tunnel server, or the server's target.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    remote: String,
    buffer_size: u32,
}

impl TcpDialer {
    /// Create a dialer for `remote` (`host:port`).
    pub fn new(remote: impl Into<String>, bandwidth_mbps: u32) -> Self {
        Self {
            remote: remote.into(),
            buffer_size: socket_buffer_size(bandwidth_mbps),
        }
    }

    async fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_send_buffer_size(self.buffer_size)?;
        socket.set_recv_buffer_size(self.buffer_size)?;

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> io::Result<Carrier> {
        let mut last_err = None;

        for addr in lookup_host(self.remote.as_str()).await? {
            match self.connect_addr(addr).await {
                Ok(stream) => return Ok(Carrier::new(stream, Some(addr))),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", self.remote),
            )
        }))
    }

    fn remote(&self) -> &str {
        &self.remote
    }
}

/// Accepts tunnel clients over TCP.
#[derive(Debug)]
pub struct TcpCarrierListener {
    listener: TcpListener,
}

impl TcpCarrierListener {
    /// Bind to `addr`; `:port` binds all interfaces.
    pub async fn bind(addr: &str, bandwidth_mbps: u32) -> io::Result<Self> {
        let addr = resolve_one(&normalize_listen_addr(addr)).await?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        // Accepted sockets inherit these.
        let size = socket_buffer_size(bandwidth_mbps);
        socket.set_reuseaddr(true)?;
        socket.set_recv_buffer_size(size)?;
        socket.set_send_buffer_size(size)?;
        socket.bind(addr)?;

        Ok(Self {
            listener: socket.listen(LISTEN_BACKLOG)?,
        })
    }

    /// Wrap an already bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }
}

#[async_trait]
impl CarrierListener for TcpCarrierListener {
    async fn accept(&mut self) -> io::Result<Carrier> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(Carrier::new(stream, Some(peer)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Bind the client's local listener; `:port` binds all interfaces.
pub async fn bind_local(addr: &str) -> io::Result<TcpListener> {
    TcpListener::bind(normalize_listen_addr(addr)).await
}

async fn resolve_one(addr: &str) -> io::Result<SocketAddr> {
    lookup_host(addr).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{} resolved to no addresses", addr),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_and_accept() {
        let mut listener = TcpCarrierListener::bind("127.0.0.1:0", 10).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = TcpDialer::new(addr.to_string(), 10);
        let (dialed, accepted) = tokio::join!(dialer.dial(), listener.accept());
        let mut dialed = dialed.unwrap();
        let mut accepted = accepted.unwrap();

        assert_eq!(dialed.peer, Some(addr));
        assert!(accepted.peer.is_some());

        dialed.io.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        accepted.io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        let dialer = TcpDialer::new(addr.to_string(), 10);
        assert!(dialer.dial().await.is_err());
    }

    #[tokio::test]
    async fn test_bind_local_short_form() {
        let listener = bind_local(":0").await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_unspecified());
    }
}
