//! Observability sink.
//!
//! Components never log directly. They receive an [`Observer`] at
//! construction and report typed [`Event`]s to it. [`TracingObserver`] turns
//! events into `tracing` records and [`TunnelMetrics`] counters;
//! [`RecordingObserver`] keeps them in memory so tests can assert on them.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::client::ClientState;
use crate::handshake::Iv;
use crate::metrics::TunnelMetrics;
use crate::relay::RelayStats;

/// Where a carrier's handling path failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Establishing the carrier
    Dial,
    /// Sending or receiving the IV
    Handshake,
    /// Building the multiplexer
    Session,
    /// Opening a logical stream (client)
    Open,
    /// Accepting a logical stream (server)
    Accept,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dial => "dial",
            Stage::Handshake => "handshake",
            Stage::Session => "session",
            Stage::Open => "open",
            Stage::Accept => "accept",
        };
        f.write_str(name)
    }
}

/// Something that happened in the tunnel.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A listener is accepting connections
    Listening { addr: SocketAddr },
    /// Client lifecycle moved to a new state
    StateChanged { state: ClientState },
    /// A carrier was dialed or accepted
    CarrierConnected { peer: Option<SocketAddr> },
    /// The IV for a carrier was sent or received
    HandshakeCompleted { iv: Iv },
    /// A session is ready on the carrier
    SessionEstablished { encrypted: bool },
    /// A carrier's handling path failed
    CarrierFailed { stage: Stage, error: String },
    /// A carrier's handling path ended
    CarrierClosed { peer: Option<SocketAddr> },
    /// The client is replacing its carrier
    Reconnecting { attempt: u64 },
    /// A listening socket failed to accept
    AcceptFailed { error: String },
    /// A forwarded connection started relaying
    StreamOpened,
    /// A forwarded connection finished
    StreamClosed { stats: RelayStats },
    /// The server could not reach its target
    TargetDialFailed { target: String, error: String },
}

/// Receives tunnel events.
pub trait Observer: Send + Sync {
    /// Handle one event. Must not block.
    fn event(&self, event: Event);
}

/// Logs events with `tracing` and keeps aggregate counters.
#[derive(Default)]
pub struct TracingObserver {
    metrics: Arc<TunnelMetrics>,
}

impl TracingObserver {
    /// Create an observer with fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an observer sharing existing counters.
    pub fn with_metrics(metrics: Arc<TunnelMetrics>) -> Self {
        Self { metrics }
    }

    /// Counters updated by this observer.
    pub fn metrics(&self) -> &Arc<TunnelMetrics> {
        &self.metrics
    }
}

impl Observer for TracingObserver {
    fn event(&self, event: Event) {
        match event {
            Event::Listening { addr } => {
                tracing::info!("listening on {}", addr);
            }
            Event::StateChanged { state } => {
                tracing::debug!("client state: {:?}", state);
            }
            Event::CarrierConnected { peer } => {
                self.metrics.carrier_opened();
                match peer {
                    Some(peer) => tracing::info!("carrier connected: {}", peer),
                    None => tracing::info!("carrier connected"),
                }
            }
            Event::HandshakeCompleted { iv } => {
                tracing::debug!("handshake complete, iv {}", iv);
            }
            Event::SessionEstablished { encrypted } => {
                tracing::info!("session established, tunnel encryption: {}", encrypted);
            }
            Event::CarrierFailed { stage, error } => {
                self.metrics.increment_carrier_failures();
                tracing::warn!("carrier {} failed: {}", stage, error);
            }
            Event::CarrierClosed { peer } => {
                self.metrics.carrier_closed();
                match peer {
                    Some(peer) => tracing::info!("carrier closed: {}", peer),
                    None => tracing::info!("carrier closed"),
                }
            }
            Event::Reconnecting { attempt } => {
                self.metrics.increment_reconnects();
                tracing::warn!("reconnecting (attempt {})", attempt);
            }
            Event::AcceptFailed { error } => {
                tracing::warn!("accept failed: {}", error);
            }
            Event::StreamOpened => {
                self.metrics.stream_opened();
                tracing::debug!("stream opened");
            }
            Event::StreamClosed { stats } => {
                self.metrics.stream_closed(
                    stats.local_to_remote,
                    stats.remote_to_local,
                    stats.error.is_some(),
                );
                match &stats.error {
                    Some(e) => tracing::debug!(
                        "stream closed after {}/{} bytes: {}",
                        stats.local_to_remote,
                        stats.remote_to_local,
                        e
                    ),
                    None => tracing::debug!(
                        "stream closed after {}/{} bytes",
                        stats.local_to_remote,
                        stats.remote_to_local
                    ),
                }
            }
            Event::TargetDialFailed { target, error } => {
                self.metrics.increment_dial_failures();
                tracing::warn!("dial {} failed: {}", target, error);
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    /// Copy of all events so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(*e)).count()
    }

    /// IVs from every completed handshake, in order.
    pub fn ivs(&self) -> Vec<Iv> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::HandshakeCompleted { iv } => Some(*iv),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `n` events match `pred`, or `limit` passes.
    ///
    /// Returns whether the condition was met.
    pub async fn wait_for(
        &self,
        n: usize,
        limit: Duration,
        pred: impl Fn(&Event) -> bool,
    ) -> bool {
        let waited = tokio::time::timeout(limit, async {
            while self.count(&pred) < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        waited.is_ok()
    }
}

impl Observer for RecordingObserver {
    fn event(&self, event: Event) {
        self.events.lock().push(event);
    }
}
