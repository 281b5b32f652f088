use codedrop_core::{AppConfig, run_server};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (CODEDROP_* overrides, RUST_LOG)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = AppConfig::load();

    // Ctrl-C triggers graceful shutdown
    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Ctrl-C received");
        shutdown.cancel();
    });

    if let Err(e) = run_server(config, cancel_token).await {
        tracing::error!("Server error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
