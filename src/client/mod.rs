//! Tunnel client.
//!
//! The client owns one local listener for its whole life and at most one
//! carrier at a time. Each local connection becomes one logical stream on the
//! current session. When opening a stream fails, the session is considered
//! dead: the carrier is dropped and a new one is dialed, with a new IV and a
//! new session. Relays already running on the old session are left alone and
//! end when their streams fail.
//!
//! ```text
//!            dial + IV        session built      first accept
//! Connecting ─────────▶ HandshakeSent ─────▶ SessionEstablished ─────▶ Serving
//!     ▲                                                                   │
//!     └──────────────────────────── open failed ──────────────────────────┘
//! ```

pub mod config;

pub use config::ClientConfig;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::crypto::{IvSource, OsIvSource, TunnelKey};
use crate::error::{Error, Result};
use crate::handshake::{send_iv, Iv};
use crate::observe::{Event, Observer, Stage, TracingObserver};
use crate::relay::relay_observed;
use crate::session::{Multiplexer, Opener, YamuxMultiplexer};
use crate::transport::{BoxedIo, Carrier, Dialer, SecureStream, TcpDialer};

/// Where the client is in its connect/serve cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Dialing a new carrier
    Connecting,
    /// Carrier up; when encrypting, the IV has been sent
    HandshakeSent,
    /// Session built over the carrier
    SessionEstablished,
    /// Forwarding local connections
    Serving,
}

/// Outcome of one lifecycle step.
#[derive(Debug)]
pub enum Transition {
    /// Step succeeded; carry on from the current state
    Continue,
    /// The carrier failed at `stage`; drop it and dial again
    Reconnect { stage: Stage, error: Error },
    /// Stop the client with this error
    Fatal(Error),
}

/// Forwards local TCP connections through a multiplexed tunnel.
pub struct Client {
    dialer: Arc<dyn Dialer>,
    multiplexer: Arc<dyn Multiplexer>,
    key: Option<TunnelKey>,
    iv_source: Arc<dyn IvSource>,
    observer: Arc<dyn Observer>,
    reconnect_delay: Duration,
}

impl Client {
    /// Create a client dialing through `dialer`; `key` enables encryption.
    pub fn new(dialer: Arc<dyn Dialer>, key: Option<TunnelKey>) -> Self {
        Self {
            dialer,
            multiplexer: Arc::new(YamuxMultiplexer::default()),
            key,
            iv_source: Arc::new(OsIvSource::default()),
            observer: Arc::new(TracingObserver::new()),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Create a TCP client from configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        let dialer = TcpDialer::new(config.remote_addr.clone(), config.bandwidth);
        Self::new(Arc::new(dialer), config.tunnel_key())
            .with_reconnect_delay(config.reconnect_delay())
    }

    /// Use a different multiplexer.
    pub fn with_multiplexer(mut self, multiplexer: Arc<dyn Multiplexer>) -> Self {
        self.multiplexer = multiplexer;
        self
    }

    /// Use a different IV source.
    pub fn with_iv_source(mut self, iv_source: Arc<dyn IvSource>) -> Self {
        self.iv_source = iv_source;
        self
    }

    /// Report events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Pause between failed reconnect dials.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Whether carriers are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Serve connections accepted on `listener` until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Fails if the very first dial fails or a setup error (such as an
    /// unusable cipher) occurs. Carrier failures after that reconnect.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            self.observer.event(Event::Listening { addr });
        }

        let mut lifecycle = Lifecycle::new(self);
        lifecycle.enter(ClientState::Connecting);

        loop {
            let transition = tokio::select! {
                _ = shutdown.cancelled() => break,
                t = lifecycle.step(&listener) => t,
            };

            match transition {
                Transition::Continue => {}
                Transition::Reconnect { stage, error } => {
                    self.observer.event(Event::CarrierFailed {
                        stage,
                        error: error.to_string(),
                    });
                    lifecycle.teardown();
                    lifecycle.reconnects += 1;
                    self.observer.event(Event::Reconnecting {
                        attempt: lifecycle.reconnects,
                    });
                    lifecycle.enter(ClientState::Connecting);
                }
                Transition::Fatal(error) => {
                    lifecycle.teardown();
                    return Err(error);
                }
            }
        }

        lifecycle.teardown();
        Ok(())
    }
}

/// State of one client run: the current carrier attempt and its history.
struct Lifecycle<'a> {
    client: &'a Client,
    state: ClientState,
    carrier: Option<Carrier>,
    iv: Option<Iv>,
    opener: Option<Box<dyn Opener>>,
    /// Peer of the carrier currently counted as connected
    live: Option<Option<SocketAddr>>,
    dialed_once: bool,
    reconnects: u64,
}

impl<'a> Lifecycle<'a> {
    fn new(client: &'a Client) -> Self {
        Self {
            client,
            state: ClientState::Connecting,
            carrier: None,
            iv: None,
            opener: None,
            live: None,
            dialed_once: false,
            reconnects: 0,
        }
    }

    fn enter(&mut self, state: ClientState) {
        self.state = state;
        self.client.observer.event(Event::StateChanged { state });
    }

    async fn step(&mut self, listener: &TcpListener) -> Transition {
        match self.state {
            ClientState::Connecting => self.connect().await,
            ClientState::HandshakeSent => self.establish(),
            ClientState::SessionEstablished => {
                self.enter(ClientState::Serving);
                Transition::Continue
            }
            ClientState::Serving => self.serve(listener).await,
        }
    }

    /// Dial a carrier and, when encrypting, hand it a fresh IV.
    async fn connect(&mut self) -> Transition {
        let client = self.client;

        let mut carrier = match client.dialer.dial().await {
            Ok(carrier) => carrier,
            Err(e) if !self.dialed_once => return Transition::Fatal(Error::Network(e)),
            Err(e) => {
                client.observer.event(Event::CarrierFailed {
                    stage: Stage::Dial,
                    error: e.to_string(),
                });
                tokio::time::sleep(client.reconnect_delay).await;
                return Transition::Continue;
            }
        };
        self.dialed_once = true;
        self.live = Some(carrier.peer);
        client.observer.event(Event::CarrierConnected { peer: carrier.peer });

        if client.key.is_some() {
            match send_iv(&mut carrier.io, client.iv_source.as_ref()).await {
                Ok(iv) => {
                    client.observer.event(Event::HandshakeCompleted { iv });
                    self.iv = Some(iv);
                }
                Err(error) => {
                    return Transition::Reconnect {
                        stage: Stage::Handshake,
                        error,
                    }
                }
            }
        }

        self.carrier = Some(carrier);
        self.enter(ClientState::HandshakeSent);
        Transition::Continue
    }

    /// Build the client-role session over the (secured) carrier.
    fn establish(&mut self) -> Transition {
        let client = self.client;

        let Some(carrier) = self.carrier.take() else {
            return Transition::Reconnect {
                stage: Stage::Session,
                error: Error::session("no carrier to build a session on"),
            };
        };

        let io: BoxedIo = match (&client.key, &self.iv) {
            (Some(key), Some(iv)) => match SecureStream::new(key, carrier.io, iv.as_ref()) {
                Ok(secure) => Box::new(secure),
                Err(e) => return Transition::Fatal(e),
            },
            _ => carrier.io,
        };

        match client.multiplexer.client(io) {
            Ok(opener) => {
                self.opener = Some(opener);
                client.observer.event(Event::SessionEstablished {
                    encrypted: client.is_encrypted(),
                });
                self.enter(ClientState::SessionEstablished);
                Transition::Continue
            }
            Err(error) if error.is_fatal_setup() => Transition::Fatal(error),
            Err(error) => Transition::Reconnect {
                stage: Stage::Session,
                error,
            },
        }
    }

    /// Accept local connections and relay each over a new logical stream.
    async fn serve(&mut self, listener: &TcpListener) -> Transition {
        let client = self.client;
        let observer = &client.observer;

        let Some(opener) = self.opener.as_mut() else {
            return Transition::Reconnect {
                stage: Stage::Open,
                error: Error::session("no session to open streams on"),
            };
        };

        loop {
            let local = match accept_local(listener).await {
                Ok(stream) => stream,
                Err(e) => {
                    observer.event(Event::AcceptFailed {
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match opener.open().await {
                Ok(stream) => {
                    let observer = Arc::clone(observer);
                    tokio::spawn(async move {
                        relay_observed(local, stream, observer).await;
                    });
                }
                Err(error) => {
                    drop(local);
                    return Transition::Reconnect {
                        stage: Stage::Open,
                        error,
                    };
                }
            }
        }
    }

    /// Drop the session and carrier of the current attempt.
    fn teardown(&mut self) {
        self.opener = None;
        self.carrier = None;
        self.iv = None;
        if let Some(peer) = self.live.take() {
            self.client.observer.event(Event::CarrierClosed { peer });
        }
    }
}

/// Accept one local connection; a socket that cannot be tuned is dropped.
async fn accept_local(listener: &TcpListener) -> std::io::Result<TcpStream> {
    let (stream, _) = listener.accept().await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
