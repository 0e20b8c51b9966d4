//! muxtun client binary.
//!
//! Usage: muxtun-client [OPTIONS]
//!
//! Listens locally and forwards every accepted connection over one
//! multiplexed (optionally encrypted) carrier to the muxtun server. Run with
//! `--help` for the option list.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use muxtun::cli::{self, ClientArgs};
use muxtun::client::Client;
use muxtun::metrics::TunnelMetrics;
use muxtun::observe::TracingObserver;
use muxtun::transport::bind_local;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();
    let print_config = args.print_config;
    let config = args.into_config()?;

    if print_config {
        print!("{}", toml::to_string(&config)?);
        return Ok(());
    }

    cli::init_tracing();

    tracing::info!("remote: {}", config.remote_addr);
    tracing::info!("tunnel encryption: {}", config.encrypt);
    if let Some(key) = config.tunnel_key() {
        tracing::info!("key fingerprint: {}", key.fingerprint());
    }

    let listener = bind_local(&config.local_addr)
        .await
        .with_context(|| format!("binding {}", config.local_addr))?;

    let metrics = Arc::new(TunnelMetrics::new());
    let client = Client::from_config(&config)
        .with_observer(Arc::new(TracingObserver::with_metrics(Arc::clone(&metrics))));

    let shutdown = CancellationToken::new();
    cli::spawn_signal_handler(shutdown.clone());

    let result = client.run(listener, shutdown).await;
    println!("{}", metrics.format_report());
    result.context("client stopped")
}
