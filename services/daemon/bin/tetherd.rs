//! Main Entrypoint for the Tether Daemon
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Starting the liveness endpoint.
//! 4. Running the supervisor until shutdown or a fatal condition, and
//!    mapping the outcome to the process exit status. A failure exit is
//!    the escalation contract: the external process supervisor relaunches
//!    the daemon from scratch.

use anyhow::Context;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use tether_daemon::{
    config::Config,
    gateway::GatewayClient,
    router::create_router,
    supervisor::{Outcome, Supervisor},
};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the daemon.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // --- 1. Load Configuration ---
    let config = Arc::new(Config::from_env().context("Failed to load configuration")?);

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(
        group_id = %config.group_id,
        channel_id = %config.channel_id,
        gateway = %config.gateway_url,
        "Configuration loaded"
    );

    // --- 3. Start Liveness Endpoint ---
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.liveness_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind liveness endpoint")?;
    info!(%addr, "Liveness endpoint listening");
    let server = tokio::spawn(async move { axum::serve(listener, create_router()).await });

    // --- 4. Run the Supervisor ---
    let client = Arc::new(GatewayClient::new(config.gateway_url.clone()));
    let supervisor = Supervisor::new(config, client);

    let outcome = tokio::select! {
        outcome = supervisor.run(shutdown_signal()) => outcome,
        result = server => {
            // An unobserved failure in a background task is fatal; exit
            // and let the process supervisor relaunch us.
            error!(?result, "Liveness server terminated unexpectedly");
            Outcome::Restart
        }
    };

    match outcome {
        Outcome::Shutdown => {
            info!("Daemon has shut down.");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Restart => {
            error!("Exiting with failure status for the process supervisor.");
            Ok(ExitCode::FAILURE)
        }
    }
}
