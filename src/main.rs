use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bubble_server::config::ServerConfig;
use bubble_server::metrics::{self, Metrics};
use bubble_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Bubble Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, {:?} tick policy at {} Hz, map {}x{}",
        config.bind_address,
        config.port,
        config.game.tick_policy,
        config.game.tick_rate,
        config.game.map_width,
        config.game.map_height
    );

    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let server = WebTransportServer::new(config.clone(), metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}
