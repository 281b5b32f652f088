//! Whole-mapping metadata persistence.
//!
//! Stores only know how to load and replace the full mapping. Serializing
//! writers is [`super::MetadataLedger`]'s job.

use crate::error::StorageError;
use crate::record::TransferMap;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load the current mapping.
    async fn load(&self) -> Result<TransferMap, StorageError>;

    /// Replace the stored mapping with `map`.
    async fn save(&self, map: &TransferMap) -> Result<(), StorageError>;
}

/// The mapping as one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
}

impl JsonFileMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataStore for JsonFileMetadataStore {
    async fn load(&self) -> Result<TransferMap, StorageError> {
        match fs::read(&self.path).await {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            // Nothing saved yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TransferMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, map: &TransferMap) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(map)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write aside and rename so the old mapping survives a failed write
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, &json).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-memory metadata store, mainly for tests.
#[derive(Default)]
pub struct MemoryMetadataStore {
    map: RwLock<TransferMap>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn load(&self) -> Result<TransferMap, StorageError> {
        Ok(self.map.read().await.clone())
    }

    async fn save(&self, map: &TransferMap) -> Result<(), StorageError> {
        *self.map.write().await = map.clone();
        Ok(())
    }
}
