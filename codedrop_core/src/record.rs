//! Per-code transfer metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Full metadata mapping, keyed by transfer code.
pub type TransferMap = HashMap<String, TransferRecord>;

/// Stored metadata for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub code: String,
    /// Blob key of the message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ref: Option<String>,
    /// Blob key of the uploaded file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,
    /// Name the sender uploaded the file under, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_display: Option<String>,
    /// Unix timestamp in milliseconds
    pub expires_at: u64,
}

impl TransferRecord {
    /// A record is dead once `now` is strictly past its expiry.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        now_millis > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn has_file(&self) -> bool {
        self.file_ref.is_some()
    }

    /// Every blob key this record points at.
    pub fn blob_refs(&self) -> impl Iterator<Item = &str> {
        self.message_ref
            .as_deref()
            .into_iter()
            .chain(self.file_ref.as_deref())
    }
}

pub fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
