//! Carrier transport.
//!
//! The carrier is the single reliable duplex byte stream between client and
//! server that everything else is layered on. Its wire format and congestion
//! behaviour are opaque to the tunnel; the core only needs to dial, listen and
//! accept.
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │  Logical streams (one per forwarded TCP conn)  │
//! ├────────────────────────────────────────────────┤
//! │  Session (multiplexer)                         │
//! ├────────────────────────────────────────────────┤
//! │  SecureStream (AES-256-CFB, optional)          │
//! ├────────────────────────────────────────────────┤
//! │  Carrier (TCP by default)                      │
//! └────────────────────────────────────────────────┘
//! ```

mod secure;
mod tcp;

pub use secure::SecureStream;
pub use tcp::{bind_local, TcpCarrierListener, TcpDialer};

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Default bandwidth hint in Mbit/s.
pub const DEFAULT_BANDWIDTH_MBPS: u32 = 10;

/// Round-trip time assumed when turning a bandwidth hint into a buffer size.
pub const ASSUMED_RTT_MS: u64 = 100;

/// Smallest socket buffer the bandwidth hint can produce.
pub const MIN_SOCKET_BUFFER: u32 = 64 * 1024;

/// Largest socket buffer the bandwidth hint can produce.
pub const MAX_SOCKET_BUFFER: u32 = 16 * 1024 * 1024;

/// Any duplex byte stream usable as a carrier or logical stream.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased duplex stream.
pub type BoxedIo = Box<dyn Io>;

/// One established carrier connection.
pub struct Carrier {
    /// The byte stream itself
    pub io: BoxedIo,
    /// Remote address, when the transport has one
    pub peer: Option<SocketAddr>,
}

impl Carrier {
    /// Wrap any duplex stream as a carrier.
    pub fn new(io: impl Io + 'static, peer: Option<SocketAddr>) -> Self {
        Self {
            io: Box::new(io),
            peer,
        }
    }
}

impl std::fmt::Debug for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Carrier").field("peer", &self.peer).finish()
    }
}

/// Outbound side of the transport: dials one configured address.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Establish a new carrier connection.
    async fn dial(&self) -> io::Result<Carrier>;

    /// Address being dialed, for reporting.
    fn remote(&self) -> &str;
}

/// Server side of the transport: yields inbound carriers.
#[async_trait]
pub trait CarrierListener: Send {
    /// Wait for the next inbound carrier.
    async fn accept(&mut self) -> io::Result<Carrier>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Socket buffer size for a bandwidth hint: one bandwidth-delay product at
/// [`ASSUMED_RTT_MS`], clamped to sane bounds.
pub fn socket_buffer_size(bandwidth_mbps: u32) -> u32 {
    let bytes_per_sec = u64::from(bandwidth_mbps) * 1_000_000 / 8;
    let bdp = bytes_per_sec * ASSUMED_RTT_MS / 1000;
    bdp.clamp(u64::from(MIN_SOCKET_BUFFER), u64::from(MAX_SOCKET_BUFFER)) as u32
}

/// Normalise `:port` to `0.0.0.0:port`.
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}
