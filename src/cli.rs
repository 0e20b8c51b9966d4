//! Command-line handling shared by the two binaries.

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::server::ServerConfig;

/// muxtun client arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "muxtun-client",
    version,
    about = "Forward local TCP connections through a multiplexed tunnel"
)]
pub struct ClientArgs {
    /// Config file path (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Local listen address.
    #[arg(short = 'l', long = "local")]
    pub local_addr: Option<String>,

    /// Tunnel server address.
    #[arg(short = 'r', long = "remote")]
    pub remote_addr: Option<String>,

    /// Tunnel passphrase.
    #[arg(long, env = "MUXTUN_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Bandwidth hint in Mbit/s.
    #[arg(short, long)]
    pub bandwidth: Option<u32>,

    /// Encrypt the tunnel.
    #[arg(long)]
    pub tuncrypt: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

impl ClientArgs {
    /// Load the config file, if any, and apply flag overrides.
    pub fn into_config(self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };

        if let Some(addr) = self.local_addr {
            config.local_addr = addr;
        }
        if let Some(addr) = self.remote_addr {
            config.remote_addr = addr;
        }
        if let Some(key) = self.key {
            config.key = key;
        }
        if let Some(bandwidth) = self.bandwidth {
            config.bandwidth = bandwidth;
        }
        if self.tuncrypt {
            config.encrypt = true;
        }

        config.validate().map_err(Error::Config)?;
        Ok(config)
    }
}

/// muxtun server arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "muxtun-server",
    version,
    about = "Accept multiplexed tunnels and forward their streams to a target"
)]
pub struct ServerArgs {
    /// Config file path (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address for tunnel carriers.
    #[arg(short = 'l', long = "listen")]
    pub listen_addr: Option<String>,

    /// Target address for forwarded connections.
    #[arg(short = 't', long = "target")]
    pub target_addr: Option<String>,

    /// Tunnel passphrase.
    #[arg(long, env = "MUXTUN_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Bandwidth hint in Mbit/s.
    #[arg(short, long)]
    pub bandwidth: Option<u32>,

    /// Expect an encrypted tunnel.
    #[arg(long)]
    pub tuncrypt: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

impl ServerArgs {
    /// Load the config file, if any, and apply flag overrides.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(addr) = self.target_addr {
            config.target_addr = addr;
        }
        if let Some(key) = self.key {
            config.key = key;
        }
        if let Some(bandwidth) = self.bandwidth {
            config.bandwidth = bandwidth;
        }
        if self.tuncrypt {
            config.encrypt = true;
        }

        config.validate().map_err(Error::Config)?;
        Ok(config)
    }
}

/// Install the global subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
