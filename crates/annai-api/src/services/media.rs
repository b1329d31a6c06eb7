//! Stored uploads exposed to the transcriber.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use annai_ml_client::MediaSource;
use annai_storage::{StoredUpload, UploadStore};

/// An upload read back from storage on demand.
pub struct StoredMedia {
    uploads: Arc<dyn UploadStore>,
    stored: StoredUpload,
}

impl StoredMedia {
    pub fn new(uploads: Arc<dyn UploadStore>, stored: StoredUpload) -> Self {
        Self { uploads, stored }
    }
}

#[async_trait]
impl MediaSource for StoredMedia {
    fn filename(&self) -> &str {
        &self.stored.filename
    }

    fn size(&self) -> u64 {
        self.stored.size
    }

    async fn open(&self) -> io::Result<BoxStream<'static, io::Result<Bytes>>> {
        self.uploads.open(&self.stored.key).await.map_err(io::Error::other)
    }
}
