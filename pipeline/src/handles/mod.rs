//! Presigned upload and download handles for the incoming bucket.
//!
//! The two issuers are separate services: the upload side can only sign
//! writes and never reads the bucket, the download side checks existence
//! and signs reads. Neither keeps state; every call mints a new grant.

use crate::models::{HandleMethod, ObjectKey, PresignedHandle};
use crate::storage::{ObjectPresigner, ObjectStorage};
use chrono::Utc;
use common::config::HandleSettings;
use common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct HandleConfig {
    pub ttl: Duration,
}

impl HandleConfig {
    pub fn from_settings(settings: &HandleSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_secs),
        }
    }
}

async fn mint(
    presigner: &dyn ObjectPresigner,
    method: HandleMethod,
    key: &ObjectKey,
    ttl: Duration,
) -> Result<PresignedHandle> {
    let issued_at = Utc::now();
    let url = presigner.presign(method, key.as_str(), ttl).await?;
    let expiry = issued_at
        + chrono::Duration::from_std(ttl).map_err(|e| Error::Presign(e.to_string()))?;

    Ok(PresignedHandle {
        url,
        method,
        object_key: key.as_str().to_string(),
        expiry,
    })
}

pub struct UploadHandleIssuer {
    presigner: Arc<dyn ObjectPresigner>,
    config: HandleConfig,
}

impl UploadHandleIssuer {
    pub fn new(presigner: Arc<dyn ObjectPresigner>, config: HandleConfig) -> Self {
        Self { presigner, config }
    }

    /// Write-only handle for exactly `file_name`. Does not touch storage.
    pub async fn issue_upload_handle(&self, file_name: &str) -> Result<PresignedHandle> {
        let key = ObjectKey::parse(file_name)?;
        let handle = mint(&*self.presigner, HandleMethod::Put, &key, self.config.ttl).await?;

        info!(key = %key, expiry = %handle.expiry, "Issued upload handle");
        Ok(handle)
    }
}

pub struct DownloadHandleIssuer {
    storage: Arc<dyn ObjectStorage>,
    presigner: Arc<dyn ObjectPresigner>,
    config: HandleConfig,
}

impl DownloadHandleIssuer {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        presigner: Arc<dyn ObjectPresigner>,
        config: HandleConfig,
    ) -> Self {
        Self {
            storage,
            presigner,
            config,
        }
    }

    /// Read-only handle for an existing object; `Error::NotFound` otherwise.
    pub async fn issue_download_handle(&self, file_name: &str) -> Result<PresignedHandle> {
        let key = ObjectKey::parse(file_name)?;

        if !self.storage.check_file_exists(key.as_str()).await? {
            return Err(Error::NotFound(format!(
                "File '{}' not found in bucket {}",
                key,
                self.storage.bucket()
            )));
        }

        let handle = mint(&*self.presigner, HandleMethod::Get, &key, self.config.ttl).await?;

        info!(key = %key, expiry = %handle.expiry, "Issued download handle");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use url::Url;

    fn issuers() -> (Arc<MemoryStorage>, UploadHandleIssuer, DownloadHandleIssuer) {
        let storage = Arc::new(MemoryStorage::new("incoming"));
        let config = HandleConfig {
            ttl: Duration::from_secs(300),
        };
        (
            storage.clone(),
            UploadHandleIssuer::new(storage.clone(), config),
            DownloadHandleIssuer::new(storage.clone(), storage, config),
        )
    }

    #[tokio::test]
    async fn test_upload_handle_is_put_scoped_to_key() {
        let (storage, uploads, _) = issuers();
        let before = Utc::now();

        let handle = uploads.issue_upload_handle("a.csv").await.unwrap();

        assert_eq!(handle.method, HandleMethod::Put);
        assert_eq!(handle.object_key, "a.csv");
        assert_eq!(Url::parse(&handle.url).unwrap().path(), "/a.csv");
        assert!(handle.expiry >= before + chrono::Duration::seconds(300));
        // Issuing a handle creates nothing.
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_download_before_upload_is_not_found() {
        let (_, uploads, downloads) = issuers();

        uploads.issue_upload_handle("a.csv").await.unwrap();
        let err = downloads.issue_download_handle("a.csv").await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_download_handle_for_existing_object() {
        let (storage, _, downloads) = issuers();
        storage.put_object("a.csv", b"id\n1\n").await.unwrap();

        let handle = downloads.issue_download_handle("a.csv").await.unwrap();

        assert_eq!(handle.method, HandleMethod::Get);
        assert_eq!(handle.object_key, "a.csv");
    }

    #[tokio::test]
    async fn test_repeated_issuance_mints_fresh_grants() {
        let (_, uploads, _) = issuers();

        let first = uploads.issue_upload_handle("a.csv").await.unwrap();
        let second = uploads.issue_upload_handle("a.csv").await.unwrap();

        assert_ne!(first.url, second.url);
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let (_, uploads, downloads) = issuers();

        assert!(matches!(
            uploads.issue_upload_handle("").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            downloads.issue_download_handle("../secrets").await,
            Err(Error::InvalidInput(_))
        ));
    }
}
