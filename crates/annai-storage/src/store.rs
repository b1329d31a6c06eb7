//! Upload storage abstraction.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::naming::upload_filename;

/// Chunked media bytes flowing into or out of storage.
pub type UploadBody<'a> = BoxStream<'a, io::Result<Bytes>>;

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Generated file name
    pub filename: String,
    /// Backend-specific key the bytes can be read back with
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

/// Addressable storage for uploaded media.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Write `body` under `filename`, returning the storage key and the
    /// number of bytes written.
    ///
    /// A read error on `body` surfaces as [`StorageError::BodyRead`] and
    /// leaves nothing behind.
    async fn put(
        &self,
        filename: &str,
        body: UploadBody<'_>,
        content_type: &str,
    ) -> StorageResult<(String, u64)>;

    /// Stream a stored object back.
    async fn open(&self, key: &str) -> StorageResult<UploadBody<'static>>;

    /// Confirm the backend is reachable and writable.
    async fn ping(&self) -> StorageResult<()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Store an upload under a fresh collision-resistant name.
pub async fn store_upload(
    store: &dyn UploadStore,
    original_name: &str,
    body: UploadBody<'_>,
    content_type: &str,
) -> StorageResult<StoredUpload> {
    let filename = upload_filename(original_name, Utc::now());
    let (key, size) = store.put(&filename, body, content_type).await?;

    info!(
        backend = store.backend(),
        key = %key,
        size,
        "Stored upload"
    );

    Ok(StoredUpload {
        filename,
        key,
        size,
    })
}

/// Drain `body` into a new file at `path`.
///
/// The partial file is removed if either side fails.
pub(crate) async fn write_body_to_file(path: &Path, body: UploadBody<'_>) -> StorageResult<u64> {
    let result = copy_into(path, body).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove partial upload {}: {}", path.display(), e);
            }
        }
    }
    result
}

async fn copy_into(path: &Path, mut body: UploadBody<'_>) -> StorageResult<u64> {
    let write_err = |e: io::Error| StorageError::upload_failed(format!("{}: {}", path.display(), e));

    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut size = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| StorageError::BodyRead(e.to_string()))?;
        file.write_all(&chunk).await.map_err(write_err)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(write_err)?;

    Ok(size)
}
