//! Single-writer access to a [`MetadataStore`].
//!
//! Every mutation runs load → modify → save while holding one async mutex,
//! so two submissions can never both start from the same snapshot and
//! overwrite each other's records.

use super::metadata::MetadataStore;
use crate::error::StorageError;
use crate::record::{TransferMap, TransferRecord};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub struct MetadataLedger {
    store: Arc<dyn MetadataStore>,
    write_lock: Mutex<()>,
}

impl MetadataLedger {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Current mapping, without waiting for writers.
    pub async fn snapshot(&self) -> Result<TransferMap, StorageError> {
        self.store.load().await
    }

    pub async fn get(&self, code: &str) -> Result<Option<TransferRecord>, StorageError> {
        Ok(self.snapshot().await?.remove(code))
    }

    /// Start a read-modify-write. Other writers wait until the returned
    /// transaction is committed or dropped.
    pub async fn begin(&self) -> Result<LedgerTxn<'_>, StorageError> {
        let guard = self.write_lock.lock().await;
        let records = self.store.load().await?;
        Ok(LedgerTxn {
            _guard: guard,
            store: self.store.as_ref(),
            records,
        })
    }
}

/// An open read-modify-write. Dropping it without [`LedgerTxn::commit`]
/// leaves the stored mapping untouched.
pub struct LedgerTxn<'a> {
    _guard: MutexGuard<'a, ()>,
    store: &'a dyn MetadataStore,
    records: TransferMap,
}

impl LedgerTxn<'_> {
    pub fn records(&self) -> &TransferMap {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut TransferMap {
        &mut self.records
    }

    pub fn contains(&self, code: &str) -> bool {
        self.records.contains_key(code)
    }

    pub fn insert(&mut self, record: TransferRecord) {
        self.records.insert(record.code.clone(), record);
    }

    /// Persist the modified mapping and release the write lock.
    pub async fn commit(self) -> Result<(), StorageError> {
        self.store.save(&self.records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMetadataStore;

    fn record(code: &str) -> TransferRecord {
        TransferRecord {
            code: code.to_string(),
            message_ref: None,
            file_ref: Some(format!("uploads/{}", code)),
            original_file_name: Some("a.bin".to_string()),
            file_size_display: Some("0.00 MB".to_string()),
            expires_at: u64::MAX,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_txn_is_discarded() {
        let ledger = MetadataLedger::new(Arc::new(MemoryMetadataStore::new()));

        let mut txn = ledger.begin().await.unwrap();
        txn.insert(record("AAA"));
        drop(txn);
        assert!(ledger.get("AAA").await.unwrap().is_none());

        let mut txn = ledger.begin().await.unwrap();
        txn.insert(record("AAA"));
        txn.commit().await.unwrap();
        assert!(ledger.get("AAA").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_every_record() {
        let ledger = Arc::new(MetadataLedger::new(Arc::new(MemoryMetadataStore::new())));
        let mut handles = vec![];

        for i in 0..50 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let mut txn = ledger.begin().await.unwrap();
                // Give other writers a chance to interleave
                tokio::task::yield_now().await;
                txn.insert(record(&format!("R{:02}", i)));
                txn.commit().await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(ledger.snapshot().await.unwrap().len(), 50);
    }
}
