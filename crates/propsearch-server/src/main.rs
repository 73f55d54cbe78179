use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use propsearch_core::Config;
use propsearch_server::{routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    propsearch_core::init()?;

    let (config, _) = Config::load_validated()?;
    let state = Arc::new(AppState::from_config(&config)?);
    state.warm_up().await;
    state.start_background();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server host or port")?;

    let (addr, server) = warp::serve(routes(state.clone()))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .context("Failed to bind server address")?;

    tracing::info!(
        environment = ?config.server.environment,
        "Property search listening on http://{}",
        addr
    );
    server.await;

    tracing::info!("Shutting down");
    state.shutdown().await;
    Ok(())
}
