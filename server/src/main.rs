//! Flight Oracle Server
//!
//! Boots the oracle pool, keeps the `OracleRequest` listener running under a
//! supervisor and serves the status API.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;

use flight_oracle_server::bootstrap::{bootstrap, connect_ledger};
use flight_oracle_server::config::Config;
use flight_oracle_server::logging::init_logging;
use flight_oracle_server::routes;
use flight_oracle_server::services::supervise;
use flight_oracle_server::shutdown::ShutdownController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    init_logging(config.log_format, &config.log_level);

    info!(
        ledger = config.ledger.mode(),
        oracles = config.oracle_count,
        threshold = config.consensus_threshold,
        "starting flight oracle server"
    );

    let ledger = connect_ledger(&config.ledger);
    let service = bootstrap(ledger, &config)
        .await
        .context("failed to bootstrap oracles")?;

    let shutdown = ShutdownController::new();
    let supervisor = tokio::spawn(supervise(service.listener, shutdown.subscribe()));

    let app = routes::app(service.state, &config.cors_allowed_origins);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server starting on {}", addr);

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    let graceful = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.wait().await })
        .await
        .context("server error")?;

    // Make sure the supervisor stops even if the server exited on its own.
    shutdown.shutdown();
    supervisor.await.context("listener supervisor panicked")?;
    info!("shutdown complete");
    Ok(())
}
