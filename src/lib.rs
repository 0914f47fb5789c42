pub mod agent;
pub mod bridge;
pub mod capture;
pub mod db;
pub mod diagnostics;
pub mod fingerprint;
pub mod metrics;
pub mod models;
pub mod net;
pub mod recorder;
pub mod server;
pub mod settings;
pub mod store;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use agent::{Agent, AgentOptions};
use server::ApiState;
use settings::AgentSettings;
use store::SqliteRecordingStore;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub public_dir: Option<PathBuf>,
    pub pages_dir: Option<PathBuf>,
}

/// Serve the recording API until Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let store = SqliteRecordingStore::open(config.db_path.clone())?;
    let state = ApiState {
        store: Arc::new(store),
        pages_dir: config.pages_dir.clone(),
    };
    let router = server::create_router(state, config.public_dir.clone());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(err) => error!("Failed to listen for Ctrl-C, shutting down: {err}"),
        }
        signal.cancel();
    });

    server::serve(config.bind, router, shutdown, |_| {}).await
}

/// Run a capture agent until Ctrl-C or until `duration` elapses.
pub async fn run_agent(
    settings: AgentSettings,
    options: AgentOptions,
    duration: Option<Duration>,
) -> Result<()> {
    info!("framesync agent starting against {}", options.server_url);
    let agent = Agent::start(settings, options).await?;

    match duration {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => info!("Capture duration elapsed"),
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
            }
        }
        None => match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(err) => error!("Failed to listen for Ctrl-C, shutting down: {err}"),
        },
    }

    agent.shutdown().await
}
