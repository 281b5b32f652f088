//! Transfer registry and its helpers.
//!
//! This module provides:
//! - Code allocation that never reissues a code held by a stored record
//! - Message/upload persistence through a [`crate::store::BlobStore`]
//! - Expiry-checked retrieval and download
//! - A background sweeper for expired transfers

pub mod constants;
pub mod housekeeping;
pub mod registry;
pub mod utils;

// Re-export public API
pub use housekeeping::spawn_sweeper;
pub use registry::{Download, StoredUpload, TransferRegistry, TransferView};
