use crate::storage::ObjectStorage;
use common::Result;
use std::sync::Arc;

/// Isolated copies of rejected files, kept for manual review.
pub struct Quarantine {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl Quarantine {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.to_string(),
        }
    }

    pub fn quarantine_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Copies `key` out of `source` without reading it into memory where the
    /// backend allows. Returns the quarantine key.
    pub async fn isolate(&self, source: &dyn ObjectStorage, key: &str) -> Result<String> {
        let quarantine_key = self.quarantine_key(key);
        self.storage.copy_from(source, key, &quarantine_key).await?;
        Ok(quarantine_key)
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        self.storage
            .check_file_exists(&self.quarantine_key(key))
            .await
    }

    pub fn bucket(&self) -> &str {
        self.storage.bucket()
    }
}
