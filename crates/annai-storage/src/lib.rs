//! Storage for uploaded lecture media.
//!
//! This crate provides:
//! - The `UploadStore` trait and collision-resistant upload naming
//! - A local directory backend (default)
//! - A Cloudflare R2 backend over the S3 API

pub mod error;
pub mod local;
pub mod naming;
pub mod r2;
pub mod store;

use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use local::LocalUploadStore;
pub use r2::{R2Client, R2Config};
pub use store::{store_upload, StoredUpload, UploadBody, UploadStore};

/// Which upload backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Local,
    R2,
}

impl StorageBackend {
    /// Read `STORAGE_BACKEND` (`local` or `r2`).
    pub fn from_env() -> StorageResult<Self> {
        match std::env::var("STORAGE_BACKEND") {
            Err(_) => Ok(Self::default()),
            Ok(value) => value.parse(),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "r2" => Ok(Self::R2),
            other => Err(StorageError::config_error(format!(
                "unknown STORAGE_BACKEND '{}', expected local or r2",
                other
            ))),
        }
    }
}

/// Build the configured upload store.
pub async fn upload_store_from_env() -> StorageResult<Arc<dyn UploadStore>> {
    match StorageBackend::from_env()? {
        StorageBackend::Local => Ok(Arc::new(LocalUploadStore::from_env().await?)),
        StorageBackend::R2 => Ok(Arc::new(R2Client::from_env()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("R2".parse::<StorageBackend>().unwrap(), StorageBackend::R2);
        assert!("s3".parse::<StorageBackend>().is_err());
    }
}
