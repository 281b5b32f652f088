//! Storage backends: blobs for payload bytes, metadata for transfer records.

pub mod blob;
pub mod ledger;
pub mod metadata;

pub use blob::{BlobReader, BlobStore, ByteStream, FsBlobStore, MemoryBlobStore};
pub use ledger::{LedgerTxn, MetadataLedger};
pub use metadata::{JsonFileMetadataStore, MemoryMetadataStore, MetadataStore};
