use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successfully processed incoming object. Inserted once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub record_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub source_bucket: String,
    pub content_hash: String,
    pub columns: Vec<String>,
    pub row_count: u64,
    pub processed_at: DateTime<Utc>,
}
