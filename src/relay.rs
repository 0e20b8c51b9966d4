//! Bidirectional relay between two duplex streams.
//!
//! Both copy directions run as their own task inside a [`JoinSet`]. The
//! first direction to finish, by EOF or by error, ends the relay: the other
//! task is aborted and every half of both streams is dropped before
//! [`relay`] returns, so neither stream outlives the pair.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;

use crate::observe::{Event, Observer};

/// Copy buffer per direction.
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Which way bytes were flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the local-side stream to the remote side
    LocalToRemote,
    /// From the remote side back to the local-side stream
    RemoteToLocal,
}

/// Outcome of one forwarded connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes written to the remote side
    pub local_to_remote: u64,
    /// Bytes written to the local side
    pub remote_to_local: u64,
    /// Direction whose termination closed the pair
    pub ended_by: Option<Direction>,
    /// Error that ended it, if it was not a clean EOF
    pub error: Option<String>,
}

/// Relay `local` and `remote` until either side finishes, then close both.
pub async fn relay<A, B>(local: A, remote: B) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (local_rx, local_tx) = tokio::io::split(local);
    let (remote_rx, remote_tx) = tokio::io::split(remote);

    let up = Arc::new(AtomicU64::new(0));
    let down = Arc::new(AtomicU64::new(0));

    let mut tasks = JoinSet::new();
    tasks.spawn(copy_one_way(
        local_rx,
        remote_tx,
        Arc::clone(&up),
        Direction::LocalToRemote,
    ));
    tasks.spawn(copy_one_way(
        remote_rx,
        local_tx,
        Arc::clone(&down),
        Direction::RemoteToLocal,
    ));

    let first = tasks.join_next().await;

    // Dropping the other direction's halves closes both streams.
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    let (ended_by, error) = match first {
        Some(Ok((direction, Ok(())))) => (Some(direction), None),
        Some(Ok((direction, Err(e)))) => (Some(direction), Some(e.to_string())),
        Some(Err(e)) => (None, Some(e.to_string())),
        None => (None, None),
    };

    RelayStats {
        local_to_remote: up.load(Ordering::Relaxed),
        remote_to_local: down.load(Ordering::Relaxed),
        ended_by,
        error,
    }
}

/// [`relay`], reporting the stream's lifetime to `observer`.
pub async fn relay_observed<A, B>(local: A, remote: B, observer: Arc<dyn Observer>) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    observer.event(Event::StreamOpened);
    let stats = relay(local, remote).await;
    observer.event(Event::StreamClosed {
        stats: stats.clone(),
    });
    stats
}

async fn copy_one_way<R, W>(
    mut reader: R,
    mut writer: W,
    counter: Arc<AtomicU64>,
    direction: Direction,
) -> (Direction, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    let result = async {
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                // Pass the half-close on before the pair is torn down.
                let _ = writer.shutdown().await;
                return Ok(());
            }
            writer.write_all(&buf[..n]).await?;
            writer.flush().await?;
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
    .await;

    (direction, result)
}
