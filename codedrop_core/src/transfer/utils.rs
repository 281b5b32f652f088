use crate::record::now_millis;
use crate::store::ByteStream;
use crate::transfer::constants::{MAX_FILENAME_LENGTH, MESSAGE_PREFIX, UPLOAD_PREFIX};
use futures_util::StreamExt;
use uuid::Uuid;

/// Format a byte count the way transfers display it, e.g. `"2.00 MB"`
pub fn format_file_size(size_bytes: u64) -> String {
    format!("{:.2} MB", size_bytes as f64 / (1024.0 * 1024.0))
}

/// Blob key for the message text of `code`
pub fn message_key(code: &str) -> String {
    format!("{}/{}.txt", MESSAGE_PREFIX, code)
}

/// Collision-resistant blob key for an upload: time, random tag, safe name
///
/// The last key component stays within `MAX_FILENAME_LENGTH` bytes so it is
/// a valid file name on disk.
pub fn upload_key(original_name: &str) -> String {
    let tag = &Uuid::new_v4().simple().to_string()[..8];
    let stem = format!("{}-{}-", now_millis(), tag);
    let name = truncate_file_name(
        sanitize_file_name(original_name),
        MAX_FILENAME_LENGTH - stem.len(),
    );
    format!("{}/{}{}", UPLOAD_PREFIX, stem, name)
}

/// Fail the stream with `FileTooLarge` once more than `limit` bytes went through
pub fn limit_stream(stream: ByteStream<'_>, limit: u64) -> ByteStream<'_> {
    let mut seen = 0u64;
    stream
        .map(move |chunk| {
            let chunk = chunk?;
            seen += chunk.len() as u64;
            if seen > limit {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::FileTooLarge,
                    format!("upload exceeds {} bytes", limit),
                ));
            }
            Ok(chunk)
        })
        .boxed()
}

/// Sanitize file name to prevent path traversal attacks and ensure safety
pub fn sanitize_file_name(file_name: &str) -> String {
    // Last component only, for either separator
    let file_name = file_name
        .split(['/', '\\'])
        .next_back()
        .unwrap_or("unknown_file");

    // Control characters and quotes never make it into a key
    let clean_name: String = file_name
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();

    if clean_name == ".." || clean_name == "." || clean_name.trim().is_empty() {
        return "unknown_file".to_string();
    }

    truncate_file_name(clean_name, MAX_FILENAME_LENGTH)
}

/// Cut a name to at most `max_len` bytes, keeping a short extension
fn truncate_file_name(mut name: String, max_len: usize) -> String {
    if name.len() <= max_len {
        return name;
    }

    // Keep a reasonable extension
    let ext = name
        .rfind('.')
        .map(|idx| name[idx..].to_string())
        .filter(|ext| ext.len() < 20 && ext.len() < max_len);
    let keep = max_len - ext.as_ref().map_or(0, |e| e.len());
    let base_end = name.rfind('.').filter(|_| ext.is_some()).unwrap_or(name.len());

    let mut cutoff = keep.min(base_end);
    while !name.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    name.truncate(cutoff);
    if let Some(ext) = ext {
        name.push_str(&ext);
    }
    name
}
