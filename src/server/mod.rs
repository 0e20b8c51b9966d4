//! Tunnel server.
//!
//! Every accepted carrier is handled in its own task:
//!
//! ```text
//! carrier ──▶ receive IV ──▶ SecureStream ──▶ server session ──▶ accept loop
//!            (encrypt only)  (encrypt only)                         │
//!                                                 per logical stream ▼
//!                                                  dial target ──▶ relay
//! ```
//!
//! A failure on one carrier ends that carrier's task only; a failure to reach
//! the target ends that logical stream only. The accept loop keeps polling the
//! session while relays run, since the session only moves data while polled.

pub mod config;

pub use config::ServerConfig;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::crypto::TunnelKey;
use crate::error::{Error, Result};
use crate::handshake::receive_iv_within;
use crate::observe::{Event, Observer, Stage, TracingObserver};
use crate::relay::relay_observed;
use crate::session::{LogicalStream, Multiplexer, YamuxMultiplexer};
use crate::transport::{BoxedIo, Carrier, CarrierListener, Dialer, SecureStream, TcpDialer};

/// Accepts tunnel carriers and forwards their streams to one target.
#[derive(Clone)]
pub struct Server {
    target: Arc<dyn Dialer>,
    multiplexer: Arc<dyn Multiplexer>,
    key: Option<TunnelKey>,
    observer: Arc<dyn Observer>,
    handshake_timeout: Option<Duration>,
}

impl Server {
    /// Create a server forwarding to `target`; `key` enables encryption.
    pub fn new(target: Arc<dyn Dialer>, key: Option<TunnelKey>) -> Self {
        Self {
            target,
            multiplexer: Arc::new(YamuxMultiplexer::default()),
            key,
            observer: Arc::new(TracingObserver::new()),
            handshake_timeout: None,
        }
    }

    /// Create a TCP server from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let target = TcpDialer::new(config.target_addr.clone(), config.bandwidth);
        Self::new(Arc::new(target), config.tunnel_key())
            .with_handshake_timeout(config.handshake_timeout())
    }

    /// Use a different multiplexer.
    pub fn with_multiplexer(mut self, multiplexer: Arc<dyn Multiplexer>) -> Self {
        self.multiplexer = multiplexer;
        self
    }

    /// Report events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound the wait for a client's IV.
    pub fn with_handshake_timeout(mut self, limit: Option<Duration>) -> Self {
        self.handshake_timeout = limit;
        self
    }

    /// Whether carriers are expected to be encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Accept carriers from `listener` until `shutdown` fires.
    ///
    /// Accept errors are reported and the loop continues. Carriers still
    /// being served when `shutdown` fires are aborted.
    pub async fn run<L: CarrierListener>(&self, mut listener: L, shutdown: CancellationToken) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            self.observer.event(Event::Listening { addr });
        }

        let mut carriers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(carrier) => {
                        carriers.spawn(self.clone().handle_carrier(carrier));
                    }
                    Err(e) => self.observer.event(Event::AcceptFailed {
                        error: e.to_string(),
                    }),
                },
                // Reap finished carrier tasks.
                Some(_) = carriers.join_next(), if !carriers.is_empty() => {}
            }
        }

        carriers.shutdown().await;
        Ok(())
    }

    async fn handle_carrier(self, carrier: Carrier) {
        let peer = carrier.peer;
        self.observer.event(Event::CarrierConnected { peer });

        if let Err((stage, error)) = self.serve_carrier(carrier.io).await {
            self.observer.event(Event::CarrierFailed {
                stage,
                error: error.to_string(),
            });
        }

        self.observer.event(Event::CarrierClosed { peer });
    }

    async fn serve_carrier(&self, mut io: BoxedIo) -> std::result::Result<(), (Stage, Error)> {
        let io: BoxedIo = match &self.key {
            Some(key) => {
                let iv = receive_iv_within(&mut io, self.handshake_timeout)
                    .await
                    .map_err(|e| (Stage::Handshake, e))?;
                self.observer.event(Event::HandshakeCompleted { iv });
                let secure =
                    SecureStream::new(key, io, iv.as_ref()).map_err(|e| (Stage::Handshake, e))?;
                Box::new(secure)
            }
            None => io,
        };

        let mut acceptor = self
            .multiplexer
            .server(io)
            .map_err(|e| (Stage::Session, e))?;
        self.observer.event(Event::SessionEstablished {
            encrypted: self.is_encrypted(),
        });

        // Dropped with the session, which takes its streams with it anyway.
        let mut streams = JoinSet::new();

        loop {
            tokio::select! {
                accepted = acceptor.accept() => match accepted {
                    Ok(Some(stream)) => {
                        streams.spawn(self.clone().forward(stream));
                    }
                    Ok(None) => return Ok(()),
                    Err(e) => return Err((Stage::Accept, e)),
                },
                Some(_) = streams.join_next(), if !streams.is_empty() => {}
            }
        }
    }

    /// Dial the target for one logical stream and relay between them.
    async fn forward(self, stream: LogicalStream) {
        match self.target.dial().await {
            Ok(target) => {
                relay_observed(stream, target.io, self.observer).await;
            }
            Err(e) => {
                self.observer.event(Event::TargetDialFailed {
                    target: self.target.remote().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}
