/// Transfer codes stay valid for 24 hours
pub const DEFAULT_TRANSFER_TTL_SECS: u64 = 24 * 60 * 60;

/// Largest accepted upload (100 MiB)
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Draws before giving up on finding a free code
pub const MAX_CODE_ATTEMPTS: usize = 1000;

/// Longest file name kept in a storage key
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Key prefix for message text blobs
pub const MESSAGE_PREFIX: &str = "messages";

/// Key prefix for uploaded file blobs
pub const UPLOAD_PREFIX: &str = "uploads";
