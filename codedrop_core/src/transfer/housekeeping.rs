//! Periodic removal of expired transfers.

use super::registry::TransferRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run [`TransferRegistry::sweep_expired`] every `interval` until cancelled.
pub fn spawn_sweeper(
    registry: Arc<TransferRegistry>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so start-up stays quiet
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!("Expiry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = registry.sweep_expired().await {
                        tracing::error!("Expiry sweep failed: {}", e);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TransferRecord;
    use crate::store::{MemoryBlobStore, MemoryMetadataStore};

    #[tokio::test]
    async fn test_sweeper_runs_until_cancelled() {
        let registry = Arc::new(TransferRegistry::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
        ));

        let mut txn = registry.ledger().begin().await.unwrap();
        txn.insert(TransferRecord {
            code: "AAA".to_string(),
            message_ref: None,
            file_ref: None,
            original_file_name: None,
            file_size_display: None,
            expires_at: 1,
        });
        txn.commit().await.unwrap();

        let cancel_token = CancellationToken::new();
        let handle = spawn_sweeper(
            registry.clone(),
            Duration::from_millis(10),
            cancel_token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.ledger().snapshot().await.unwrap().is_empty());

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
