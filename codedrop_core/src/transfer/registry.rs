//! Transfer registry: code allocation, payload storage and lookup.

use crate::code::{CodeSource, RandomCodes, is_well_formed, normalize_code};
use crate::config::AppConfig;
use crate::error::TransferError;
use crate::record::{TransferRecord, now_millis};
use crate::store::{
    BlobReader, BlobStore, ByteStream, FsBlobStore, JsonFileMetadataStore, LedgerTxn,
    MetadataLedger, MetadataStore,
};
use crate::transfer::constants::{DEFAULT_TRANSFER_TTL_SECS, MAX_CODE_ATTEMPTS, MAX_UPLOAD_SIZE};
use crate::transfer::utils::{format_file_size, limit_stream, message_key, upload_key};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// An upload already persisted in the blob store, waiting to be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub blob_key: String,
    /// Name as the sender supplied it
    pub original_name: String,
    pub size_bytes: u64,
}

/// What a receiver sees for a live code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    pub message: String,
    pub file_name: Option<String>,
    pub file_size: Option<String>,
    pub has_file: bool,
    pub download_url: Option<String>,
}

/// An open file ready to be streamed to a receiver.
pub struct Download {
    pub file_name: String,
    pub blob: BlobReader,
}

pub struct TransferRegistry {
    ledger: MetadataLedger,
    blobs: Arc<dyn BlobStore>,
    codes: Arc<dyn CodeSource>,
    ttl: Duration,
    max_upload_size: u64,
}

impl TransferRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            ledger: MetadataLedger::new(metadata),
            blobs,
            codes: Arc::new(RandomCodes),
            ttl: Duration::from_secs(DEFAULT_TRANSFER_TTL_SECS),
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }

    /// File-backed registry rooted at the configured data directory
    pub fn from_config(config: &AppConfig) -> Self {
        let metadata = Arc::new(JsonFileMetadataStore::new(config.metadata_path()));
        let blobs = Arc::new(FsBlobStore::new(&config.data_dir));
        tracing::debug!(
            "Metadata at {}, blobs under {}",
            metadata.path().display(),
            blobs.root().display()
        );
        Self::new(metadata, blobs)
            .with_ttl(config.transfer_ttl())
            .with_max_upload_size(config.max_upload_bytes)
    }

    pub fn with_code_source(mut self, codes: Arc<dyn CodeSource>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_upload_size(mut self, limit: u64) -> Self {
        self.max_upload_size = limit;
        self
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Direct access to the metadata, for housekeeping and tests.
    pub fn ledger(&self) -> &MetadataLedger {
        &self.ledger
    }

    /// Persist an incoming upload under a fresh key, enforcing the size limit.
    pub async fn stage_upload(
        &self,
        original_name: &str,
        stream: ByteStream<'_>,
    ) -> Result<StoredUpload, TransferError> {
        let blob_key = upload_key(original_name);
        let limited = limit_stream(stream, self.max_upload_size);

        let size_bytes = self
            .blobs
            .write_stream(&blob_key, limited)
            .await
            .map_err(|e| TransferError::from_upload(e, self.max_upload_size))?;

        tracing::debug!("Staged upload {} ({} bytes)", blob_key, size_bytes);
        Ok(StoredUpload {
            blob_key,
            original_name: original_name.to_string(),
            size_bytes,
        })
    }

    /// Remove a staged upload that will not be submitted.
    pub async fn discard_upload(&self, upload: &StoredUpload) {
        self.remove_blob(&upload.blob_key).await;
    }

    /// Record a submission and return its transfer code.
    ///
    /// A message that is blank after trimming counts as absent. If the
    /// submission fails, the staged upload is removed.
    pub async fn submit(
        &self,
        message: Option<String>,
        file: Option<StoredUpload>,
    ) -> Result<String, TransferError> {
        let message = message.filter(|m| !m.trim().is_empty());
        if message.is_none() && file.is_none() {
            return Err(TransferError::EmptyContent);
        }

        let has_message = message.is_some();
        let staged = file.clone();

        match self.record_submission(message, file).await {
            Ok(code) => {
                tracing::info!(
                    "Issued transfer code {} (message: {}, file: {})",
                    code,
                    has_message,
                    staged.is_some()
                );
                Ok(code)
            }
            Err(e) => {
                if let Some(upload) = staged {
                    self.discard_upload(&upload).await;
                }
                Err(e)
            }
        }
    }

    async fn record_submission(
        &self,
        message: Option<String>,
        file: Option<StoredUpload>,
    ) -> Result<String, TransferError> {
        // The write lock is held from code allocation until the record is saved
        let mut txn = self.ledger.begin().await?;
        let code = self.allocate_code(&txn)?;

        let message_ref = match message {
            Some(text) => {
                let key = message_key(&code);
                self.blobs.write(&key, Bytes::from(text)).await?;
                Some(key)
            }
            None => None,
        };

        let record = TransferRecord {
            code: code.clone(),
            message_ref: message_ref.clone(),
            file_ref: file.as_ref().map(|f| f.blob_key.clone()),
            original_file_name: file.as_ref().map(|f| f.original_name.clone()),
            file_size_display: file.as_ref().map(|f| format_file_size(f.size_bytes)),
            expires_at: now_millis().saturating_add(ttl_millis(self.ttl)),
        };
        txn.insert(record);

        if let Err(e) = txn.commit().await {
            if let Some(key) = message_ref {
                self.remove_blob(&key).await;
            }
            return Err(e.into());
        }
        Ok(code)
    }

    /// Draw codes until one is not taken.
    fn allocate_code(&self, txn: &LedgerTxn<'_>) -> Result<String, TransferError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.codes.next_code();
            if !txn.contains(&code) {
                return Ok(code);
            }
        }
        tracing::error!(
            "No free transfer code after {} attempts ({} codes in use)",
            MAX_CODE_ATTEMPTS,
            txn.records().len()
        );
        Err(TransferError::CodeSpaceExhausted)
    }

    /// Look up a live code and assemble what the receiver sees.
    pub async fn retrieve(&self, code: &str) -> Result<TransferView, TransferError> {
        let code = normalize_code(code);
        let record = self.live_record(&code).await?;

        let message = match record.message_ref.as_deref() {
            Some(key) => match self.blobs.read(key).await? {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => {
                    tracing::warn!("Message blob for {} is gone", code);
                    String::new()
                }
            },
            None => String::new(),
        };

        let has_file = match record.file_ref.as_deref() {
            Some(key) => {
                let present = self.blobs.exists(key).await?;
                if !present {
                    tracing::warn!("File blob for {} is gone", code);
                }
                present
            }
            None => false,
        };

        Ok(TransferView {
            message,
            file_name: record.original_file_name.filter(|_| has_file),
            file_size: record.file_size_display.filter(|_| has_file),
            has_file,
            download_url: has_file.then(|| format!("/api/download/{}", code)),
        })
    }

    /// Open the file of a live code for streaming.
    ///
    /// Expired codes are refused here as well as in [`Self::retrieve`].
    pub async fn download(&self, code: &str) -> Result<Download, TransferError> {
        let code = normalize_code(code);
        let record = self.live_record(&code).await?;

        let key = record.file_ref.as_deref().ok_or(TransferError::NotFound)?;
        let blob = self
            .blobs
            .open(key)
            .await?
            .ok_or(TransferError::NotFound)?;

        tracing::info!("Serving download for {}", code);
        Ok(Download {
            file_name: record
                .original_file_name
                .unwrap_or_else(|| "download".to_string()),
            blob,
        })
    }

    async fn live_record(&self, code: &str) -> Result<TransferRecord, TransferError> {
        if !is_well_formed(code) {
            return Err(TransferError::NotFound);
        }
        let record = self
            .ledger
            .get(code)
            .await?
            .ok_or(TransferError::NotFound)?;
        if record.is_expired() {
            return Err(TransferError::Expired);
        }
        Ok(record)
    }

    /// Delete expired records and their blobs. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize, TransferError> {
        let now = now_millis();
        let mut txn = self.ledger.begin().await?;

        let expired: Vec<String> = txn
            .records()
            .iter()
            .filter(|(_, record)| record.is_expired_at(now))
            .map(|(code, _)| code.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        // Blobs go first, under the lock, so a code reissued right after the
        // commit cannot have its fresh message blob removed
        self.remove_record_blobs(&txn, &expired).await;
        for code in &expired {
            txn.records_mut().remove(code);
        }
        txn.commit().await?;

        tracing::info!("Swept {} expired transfers", expired.len());
        Ok(expired.len())
    }

    async fn remove_record_blobs(&self, txn: &LedgerTxn<'_>, codes: &[String]) {
        for code in codes {
            if let Some(record) = txn.records().get(code) {
                for key in record.blob_refs() {
                    self.remove_blob(key).await;
                }
            }
        }
    }

    async fn remove_blob(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            tracing::warn!("Could not remove blob {}: {}", key, e);
        }
    }
}

/// TTL in milliseconds, saturating instead of wrapping for huge durations
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}
