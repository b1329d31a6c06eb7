//! Cloudflare R2 upload storage (S3 API).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::naming::is_safe_key;
use crate::store::{write_body_to_file, UploadBody, UploadStore};

/// Key prefix for uploaded lecture media.
pub const UPLOAD_PREFIX: &str = "uploads";

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| StorageError::config_error(format!("{} not set", key)))
        };

        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    pub fn upload_key(filename: &str) -> String {
        format!("{}/{}", UPLOAD_PREFIX, filename)
    }

    /// Upload a file to R2.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to bucket {}", key, self.bucket);
        Ok(())
    }

    /// Stream an object's body.
    pub async fn open_object(&self, key: &str) -> StorageResult<UploadBody<'static>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let chunks = stream::try_unfold(response.body, |mut body| async move {
            let chunk = body.try_next().await.map_err(std::io::Error::other)?;
            Ok::<_, std::io::Error>(chunk.map(|c| (c, body)))
        });
        Ok(chunks.boxed())
    }

    /// Check connectivity with a head bucket call.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl UploadStore for R2Client {
    /// S3 needs a known length, so the body is spooled to a temp file first.
    async fn put(
        &self,
        filename: &str,
        body: UploadBody<'_>,
        content_type: &str,
    ) -> StorageResult<(String, u64)> {
        if !is_safe_key(filename) {
            return Err(StorageError::invalid_key(filename));
        }
        let key = Self::upload_key(filename);
        let spool = std::env::temp_dir().join(format!("annai-spool-{}", filename));

        let size = write_body_to_file(&spool, body).await?;
        let uploaded = self.upload_file(&spool, &key, content_type).await;
        if let Err(e) = tokio::fs::remove_file(&spool).await {
            warn!("Failed to remove spool file {}: {}", spool.display(), e);
        }
        uploaded?;

        Ok((key, size))
    }

    async fn open(&self, key: &str) -> StorageResult<UploadBody<'static>> {
        self.open_object(key).await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.check_connectivity().await
    }

    fn backend(&self) -> &'static str {
        "r2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_upload_key_prefix() {
        assert_eq!(R2Client::upload_key("1-ab-x.mp4"), "uploads/1-ab-x.mp4");
    }

    #[test]
    #[serial]
    fn test_config_requires_endpoint() {
        std::env::remove_var("R2_ENDPOINT_URL");
        let err = R2Config::from_env().unwrap_err();
        assert!(err.to_string().contains("R2_ENDPOINT_URL"));
    }
}
