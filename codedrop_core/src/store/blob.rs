//! Blob storage for message text and uploaded files.
//!
//! Keys are relative, `/`-separated paths such as `messages/7K9.txt`.

use crate::error::StorageError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::RwLock;

/// Byte stream fed into [`BlobStore::write_stream`].
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// Reader handed out for downloads.
pub struct BlobReader {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub len: Option<u64>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    async fn write(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    /// Store a stream under `key`. Returns the number of bytes written.
    /// Nothing is left behind under `key` if the stream fails.
    async fn write_stream(&self, key: &str, stream: ByteStream<'_>) -> Result<u64, StorageError>;

    /// Read a whole blob, `None` if it does not exist.
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Open a blob for streaming, `None` if it does not exist.
    async fn open(&self, key: &str) -> Result<Option<BlobReader>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Blobs stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path, refusing anything that would leave the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key);
        let only_normal = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || key.contains('\\') || !only_normal {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }

    async fn create(&self, key: &str) -> Result<(PathBuf, File), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = open_secure_file(&path).await?;
        Ok((path, file))
    }
}

/// Open a file for writing with owner-only permissions on Unix
async fn open_secure_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

fn not_found_as_none<T>(res: std::io::Result<T>) -> Result<Option<T>, StorageError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let (_, mut file) = self.create(key).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn write_stream(
        &self,
        key: &str,
        mut stream: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        let (path, mut file) = self.create(key).await?;

        let mut written = 0u64;
        let result: std::io::Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            drop(file);
            if let Err(rm) = fs::remove_file(&path).await {
                tracing::warn!("Could not remove partial blob {}: {}", key, rm);
            }
            return Err(e.into());
        }
        Ok(written)
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.resolve(key)?;
        Ok(not_found_as_none(fs::read(&path).await)?.map(Bytes::from))
    }

    async fn open(&self, key: &str) -> Result<Option<BlobReader>, StorageError> {
        let path = self.resolve(key)?;
        let Some(file) = not_found_as_none(File::open(&path).await)? else {
            return Ok(None);
        };
        let len = file.metadata().await.ok().map(|m| m.len());
        Ok(Some(BlobReader {
            reader: Box::new(file),
            len,
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        not_found_as_none(fs::remove_file(&path).await)?;
        Ok(())
    }
}

/// In-memory blob store, mainly for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.blobs.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn write_stream(
        &self,
        key: &str,
        mut stream: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let written = buf.len() as u64;
        self.write(key, buf.freeze()).await?;
        Ok(written)
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn open(&self, key: &str) -> Result<Option<BlobReader>, StorageError> {
        Ok(self.read(key).await?.map(|data| BlobReader {
            len: Some(data.len() as u64),
            reader: Box::new(Cursor::new(data)),
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio::io::AsyncReadExt;

    fn chunks(parts: &[&'static [u8]]) -> ByteStream<'static> {
        let parts = parts.to_vec();
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p)))).boxed()
    }

    #[tokio::test]
    async fn test_fs_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .write("messages/ABC.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(store.exists("messages/ABC.txt").await.unwrap());
        assert_eq!(
            store.read("messages/ABC.txt").await.unwrap().unwrap(),
            Bytes::from_static(b"hello")
        );

        store.delete("messages/ABC.txt").await.unwrap();
        assert!(!store.exists("messages/ABC.txt").await.unwrap());
        assert!(store.read("messages/ABC.txt").await.unwrap().is_none());
        // Deleting twice is fine
        store.delete("messages/ABC.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_fs_stream_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let n = store
            .write_stream("uploads/1-a.bin", chunks(&[b"abc", b"def"]))
            .await
            .unwrap();
        assert_eq!(n, 6);

        let mut blob = store.open("uploads/1-a.bin").await.unwrap().unwrap();
        assert_eq!(blob.len, Some(6));
        let mut out = Vec::new();
        blob.reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdef");

        assert!(store.open("uploads/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_failed_stream_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let failing: ByteStream<'static> = stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(std::io::Error::other("client went away")),
        ])
        .boxed();

        assert!(store.write_stream("uploads/x.bin", failing).await.is_err());
        assert!(!store.exists("uploads/x.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        for key in ["../etc/passwd", "/etc/passwd", "a/../../b", "", "a\\..\\b"] {
            let err = store.read(key).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        assert!(store.is_empty().await);

        let n = store
            .write_stream("uploads/f", chunks(&[b"12", b"345"]))
            .await
            .unwrap();
        assert_eq!(n, 5);
        assert!(store.exists("uploads/f").await.unwrap());

        let mut blob = store.open("uploads/f").await.unwrap().unwrap();
        let mut out = Vec::new();
        blob.reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"12345");

        store.delete("uploads/f").await.unwrap();
        assert!(store.read("uploads/f").await.unwrap().is_none());
    }
}
