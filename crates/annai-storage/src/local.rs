//! Local directory upload storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::naming::is_safe_key;
use crate::store::{write_body_to_file, UploadBody, UploadStore};

/// Default directory for uploads, relative to the working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Read size when streaming a stored file back.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Writes uploads as flat files in one directory.
#[derive(Debug, Clone)]
pub struct LocalUploadStore {
    root: PathBuf,
}

impl LocalUploadStore {
    /// Use `root`, creating it if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::config_error(format!(
                "cannot create upload directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Create from `UPLOAD_DIR`.
    pub async fn from_env() -> StorageResult<Self> {
        let root = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string());
        Self::new(root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if !is_safe_key(key) {
            return Err(StorageError::invalid_key(key));
        }
        Ok(self.root.join(key))
    }
}

/// Stream a file in fixed-size chunks.
fn file_chunks(file: File) -> UploadBody<'static> {
    stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let read = file.read_buf(&mut buf).await?;
        let next = (read > 0).then(|| (buf.freeze(), file));
        Ok::<_, std::io::Error>(next)
    })
    .boxed()
}

#[async_trait]
impl UploadStore for LocalUploadStore {
    async fn put(
        &self,
        filename: &str,
        body: UploadBody<'_>,
        _content_type: &str,
    ) -> StorageResult<(String, u64)> {
        let path = self.path_for(filename)?;
        let size = write_body_to_file(&path, body).await?;
        debug!("Wrote {} bytes to {}", size, path.display());
        Ok((filename.to_string(), size))
    }

    async fn open(&self, key: &str) -> StorageResult<UploadBody<'static>> {
        let path = self.path_for(key)?;
        match File::open(&path).await {
            Ok(file) => Ok(file_chunks(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::DownloadFailed(e.to_string())),
        }
    }

    async fn ping(&self) -> StorageResult<()> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::config_error(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::TryStreamExt;

    use crate::store::store_upload;

    fn body(chunks: &[&'static str]) -> UploadBody<'static> {
        let chunks: Vec<std::io::Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        stream::iter(chunks).boxed()
    }

    async fn read_all(body: UploadBody<'static>) -> Vec<u8> {
        let chunks: Vec<Bytes> = body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_put_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalUploadStore::new(dir.path()).await.unwrap();

        let stored = store_upload(&store, "week 1.mp4", body(&["me", "dia"]), "video/mp4")
            .await
            .unwrap();

        assert!(stored.filename.ends_with("-week_1.mp4"));
        assert_eq!(stored.size, 5);
        assert_eq!(read_all(store.open(&stored.key).await.unwrap()).await, b"media");
        assert!(dir.path().join(&stored.filename).exists());
    }

    #[tokio::test]
    async fn test_open_streams_large_files_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalUploadStore::new(dir.path()).await.unwrap();
        let data = vec![7u8; READ_CHUNK_SIZE * 2 + 10];
        tokio::fs::write(dir.path().join("big.mp4"), &data).await.unwrap();

        let chunks: Vec<Bytes> = store.open("big.mp4").await.unwrap().try_collect().await.unwrap();
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.len() <= READ_CHUNK_SIZE));
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_failed_body_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalUploadStore::new(dir.path()).await.unwrap();

        let broken: UploadBody<'static> = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "client went away")),
        ])
        .boxed();

        let err = store.put("cut.mp4", broken, "video/mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::BodyRead(_)));
        assert!(!dir.path().join("cut.mp4").exists());
    }

    #[tokio::test]
    async fn test_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = LocalUploadStore::new(&nested).await.unwrap();
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalUploadStore::new(dir.path()).await.unwrap();

        assert!(matches!(
            store.open("../secret").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.put("a/b", body(&[]), "video/mp4").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalUploadStore::new(dir.path()).await.unwrap();
        assert!(matches!(
            store.open("nothing.mp4").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
