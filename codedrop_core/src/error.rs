//! Error types shared by the stores, the registry and the HTTP boundary.

use thiserror::Error;

/// Failure of an underlying blob or metadata backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Errors returned by [`crate::TransferRegistry`] operations.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("No content")]
    EmptyContent,

    #[error("Invalid code")]
    NotFound,

    #[error("Code expired")]
    Expired,

    #[error("Upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: u64 },

    #[error("No free transfer code available")]
    CodeSpaceExhausted,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransferError {
    /// Turn a streamed-write failure into the matching transfer error.
    ///
    /// Upload streams signal the size limit with `ErrorKind::FileTooLarge`.
    pub(crate) fn from_upload(err: StorageError, limit: u64) -> Self {
        match err {
            StorageError::Io(ref io) if io.kind() == std::io::ErrorKind::FileTooLarge => {
                TransferError::UploadTooLarge { limit }
            }
            other => TransferError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_limit_maps_to_too_large() {
        let err = StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::FileTooLarge,
            "limit",
        ));
        assert!(matches!(
            TransferError::from_upload(err, 10),
            TransferError::UploadTooLarge { limit: 10 }
        ));

        let err = StorageError::Io(std::io::Error::other("disk gone"));
        assert!(matches!(
            TransferError::from_upload(err, 10),
            TransferError::Storage(_)
        ));
    }
}
