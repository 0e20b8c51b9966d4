//! muxtun server binary.
//!
//! Usage: muxtun-server [OPTIONS]
//!
//! Accepts tunnel carriers and forwards every logical stream to the
//! configured target. Run with `--help` for the option list.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use muxtun::cli::{self, ServerArgs};
use muxtun::metrics::TunnelMetrics;
use muxtun::observe::TracingObserver;
use muxtun::server::Server;
use muxtun::transport::TcpCarrierListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let print_config = args.print_config;
    let config = args.into_config()?;

    if print_config {
        print!("{}", toml::to_string(&config)?);
        return Ok(());
    }

    cli::init_tracing();

    tracing::info!("target: {}", config.target_addr);
    tracing::info!("tunnel encryption: {}", config.encrypt);
    if let Some(key) = config.tunnel_key() {
        tracing::info!("key fingerprint: {}", key.fingerprint());
    }

    let listener = TcpCarrierListener::bind(&config.listen_addr, config.bandwidth)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    let metrics = Arc::new(TunnelMetrics::new());
    let server = Server::from_config(&config)
        .with_observer(Arc::new(TracingObserver::with_metrics(Arc::clone(&metrics))));

    let shutdown = CancellationToken::new();
    cli::spawn_signal_handler(shutdown.clone());

    let result = server.run(listener, shutdown).await;
    println!("{}", metrics.format_report());
    result.context("server stopped")
}
