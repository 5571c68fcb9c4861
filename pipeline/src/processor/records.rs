use crate::models::ProcessedRecord;
use crate::storage::ObjectStorage;
use async_trait::async_trait;
use common::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::warn;

const READ_CONCURRENCY: usize = 16;

/// Insert side of the processed record store.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Writes the record keyed by its id. Writing the same id twice leaves a
    /// single record.
    async fn put_record(&self, record: &ProcessedRecord) -> Result<()>;
}

/// Read side of the processed record store.
#[async_trait]
pub trait RecordReader: Send + Sync {
    async fn list_records(&self) -> Result<Vec<ProcessedRecord>>;
}

/// Key-value record store holding one JSON document per record id.
pub struct S3RecordStore {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl S3RecordStore {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.to_string(),
        }
    }

    fn record_key(&self, record_id: &str) -> String {
        format!("{}{}.json", self.prefix, record_id)
    }
}

#[async_trait]
impl RecordWriter for S3RecordStore {
    async fn put_record(&self, record: &ProcessedRecord) -> Result<()> {
        let body = serde_json::to_vec(record)?;
        self.storage
            .put_object(&self.record_key(&record.record_id), &body)
            .await
    }
}

#[async_trait]
impl RecordReader for S3RecordStore {
    async fn list_records(&self) -> Result<Vec<ProcessedRecord>> {
        let keys: Vec<String> = self
            .storage
            .list_objects(&self.prefix)
            .await?
            .into_iter()
            .filter(|key| key.ends_with(".json"))
            .collect();

        let storage = &self.storage;
        let documents: Vec<(String, Vec<u8>)> = stream::iter(keys)
            .map(|key| async move {
                let data = storage.get_object(&key).await?;
                Ok::<_, common::Error>((key, data))
            })
            .buffer_unordered(READ_CONCURRENCY)
            .try_collect()
            .await?;

        let mut records = Vec::with_capacity(documents.len());
        for (key, data) in documents {
            match serde_json::from_slice::<ProcessedRecord>(&data) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable record"),
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Utc;

    fn record(id: &str, file_name: &str) -> ProcessedRecord {
        ProcessedRecord {
            record_id: id.to_string(),
            file_name: file_name.to_string(),
            file_size: 42,
            source_bucket: "incoming".to_string(),
            content_hash: "abc".to_string(),
            columns: vec!["id".to_string()],
            row_count: 1,
            processed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_is_keyed_by_record_id() {
        let storage = Arc::new(MemoryStorage::new("records"));
        let store = S3RecordStore::new(storage.clone(), "records/");

        store.put_record(&record("r-1", "a.csv")).await.unwrap();
        store.put_record(&record("r-1", "a.csv")).await.unwrap();
        store.put_record(&record("r-2", "b.csv")).await.unwrap();

        assert_eq!(
            storage.list_objects("records/").await.unwrap(),
            vec!["records/r-1.json", "records/r-2.json"]
        );
    }

    #[tokio::test]
    async fn test_list_round_trips_and_skips_garbage() {
        let storage = Arc::new(MemoryStorage::new("records"));
        let store = S3RecordStore::new(storage.clone(), "records/");
        store.put_record(&record("r-1", "a.csv")).await.unwrap();
        storage.put_object("records/broken.json", b"{").await.unwrap();
        storage.put_object("records/notes.txt", b"ignored").await.unwrap();

        let records = store.list_records().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "a.csv");
        assert_eq!(records[0].record_id, "r-1");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record("r-1", "a.csv")).unwrap();
        assert_eq!(json["recordId"], "r-1");
        assert_eq!(json["fileName"], "a.csv");
        assert_eq!(json["fileSize"], 42);
        assert_eq!(json["sourceBucket"], "incoming");
    }
}
