//! In-process object storage for local runs and tests.

use crate::models::HandleMethod;
use crate::storage::s3::{ObjectBody, ObjectPresigner, ObjectStorage};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use common::Result;
use dashmap::DashMap;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

pub struct MemoryStorage {
    bucket: String,
    objects: DashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        self.objects
            .insert(key.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .get(key)
            .map(|data| data.to_vec())
            .ok_or_else(|| {
                common::Error::NotFound(format!(
                    "Object {} not found in bucket {}",
                    key, self.bucket
                ))
            })
    }

    async fn get_object_within(&self, key: &str, max_bytes: u64) -> Result<ObjectBody> {
        let size = self.objects.get(key).map(|data| data.len() as u64);
        match size {
            Some(size) if size > max_bytes => Ok(ObjectBody::Oversized { size }),
            _ => self.get_object(key).await.map(ObjectBody::Data),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn check_file_exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectPresigner for MemoryStorage {
    async fn presign(
        &self,
        method: HandleMethod,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let mut url = Url::parse(&format!("memory://{}/", self.bucket))
            .map_err(|e| common::Error::Presign(e.to_string()))?;
        url.set_path(key);

        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| common::Error::Presign(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("X-Method", method.as_str())
            .append_pair("X-Expires", &expires_at.timestamp_millis().to_string())
            .append_pair("X-Grant-Id", &Uuid::new_v4().to_string());

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let storage = MemoryStorage::new("incoming");
        let err = storage.get_object("missing.csv").await.unwrap_err();
        assert!(matches!(err, common::Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_within_reports_size_of_oversized_object() {
        let storage = MemoryStorage::new("incoming");
        storage.put_object("big.csv", b"id,name\n1,a\n").await.unwrap();

        assert_eq!(
            storage.get_object_within("big.csv", 8).await.unwrap(),
            ObjectBody::Oversized { size: 12 }
        );
        assert_eq!(
            storage.get_object_within("big.csv", 12).await.unwrap(),
            ObjectBody::Data(b"id,name\n1,a\n".to_vec())
        );
        assert!(matches!(
            storage.get_object_within("missing.csv", 8).await,
            Err(common::Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_between_stores_keeps_source() {
        let incoming = MemoryStorage::new("incoming");
        let quarantine = MemoryStorage::new("quarantine");
        incoming.put_object("bad.csv", b"id\n").await.unwrap();

        quarantine
            .copy_from(&incoming, "bad.csv", "failed/bad.csv")
            .await
            .unwrap();

        assert_eq!(quarantine.get_object("failed/bad.csv").await.unwrap(), b"id\n");
        assert!(incoming.check_file_exists("bad.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let storage = MemoryStorage::new("records");
        storage.put_object("records/b.json", b"{}").await.unwrap();
        storage.put_object("records/a.json", b"{}").await.unwrap();
        storage.put_object("other/c.json", b"{}").await.unwrap();

        let keys = storage.list_objects("records/").await.unwrap();
        assert_eq!(keys, vec!["records/a.json", "records/b.json"]);
    }

    #[tokio::test]
    async fn test_presigned_url_is_scoped_to_key() {
        let storage = MemoryStorage::new("incoming");
        let url = storage
            .presign(HandleMethod::Put, "reports/a.csv", Duration::from_secs(300))
            .await
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("incoming"));
        assert_eq!(parsed.path(), "/reports/a.csv");
        assert!(parsed.query_pairs().any(|(k, v)| k == "X-Method" && v == "PUT"));
    }
}
