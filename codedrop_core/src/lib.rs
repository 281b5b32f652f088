use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod code;
pub mod config;
pub mod error;
pub mod http_share;
pub mod record;
pub mod store;
pub mod transfer;

pub use code::{CODE_ALPHABET, CODE_LENGTH, CodeSource, RandomCodes};
pub use config::AppConfig;
pub use error::{StorageError, TransferError};
pub use record::{TransferMap, TransferRecord};
pub use transfer::{Download, StoredUpload, TransferRegistry, TransferView};

/// Run the transfer service until `cancel_token` is cancelled.
///
/// Builds the file-backed registry from `config`, starts the expiry
/// sweeper if enabled, and serves HTTP on the configured address.
pub async fn run_server(config: AppConfig, cancel_token: CancellationToken) -> Result<()> {
    tokio::fs::create_dir_all(&config.data_dir).await?;
    tracing::info!("Storing transfers under {}", config.data_dir.display());

    let registry = Arc::new(TransferRegistry::from_config(&config));

    let sweeper = config.sweep_interval().map(|interval| {
        tracing::info!("Sweeping expired transfers every {:?}", interval);
        transfer::spawn_sweeper(registry.clone(), interval, cancel_token.child_token())
    });

    let served = http_share::start_http_server(
        config.bind_addr,
        registry,
        &config,
        Some(cancel_token.clone()),
    )
    .await;

    // Stop the sweeper whether the server exited cleanly or not
    cancel_token.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    served
}
