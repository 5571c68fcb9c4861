mod config;
pub mod quarantine;
pub mod records;
pub mod validation;

pub use config::{ProcessorConfig, StorageConfig};
pub use quarantine::Quarantine;
pub use records::{RecordReader, RecordWriter, S3RecordStore};
pub use validation::{ParsedPayload, RecordValidator, ValidationError, ValidationRules};

use crate::models::{ObjectCreatedEvent, ProcessedRecord};
use crate::storage::{ObjectBody, ObjectStorage};
use chrono::Utc;
use common::config::RecordIdStrategy;
use common::{Error, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Terminal result of one processed object.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Recorded(ProcessedRecord),
    Quarantined {
        key: String,
        quarantine_key: String,
        reason: String,
    },
    /// A previous run already quarantined and removed this object.
    AlreadyQuarantined { key: String },
}

/// Routes each incoming object to the record store or to quarantine.
///
/// `Err` is reserved for infrastructure failures; invalid content is an
/// `Ok(Quarantined)` outcome and never an error.
pub struct FileProcessor {
    incoming: Arc<dyn ObjectStorage>,
    records: Arc<dyn RecordWriter>,
    quarantine: Quarantine,
    validator: RecordValidator,
    max_file_size: u64,
    record_id_strategy: RecordIdStrategy,
}

impl FileProcessor {
    pub fn new(
        incoming: Arc<dyn ObjectStorage>,
        records: Arc<dyn RecordWriter>,
        quarantine_storage: Arc<dyn ObjectStorage>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            incoming,
            records,
            quarantine: Quarantine::new(quarantine_storage, &config.quarantine_prefix),
            max_file_size: config.rules.max_file_size,
            validator: RecordValidator::new(config.rules),
            record_id_strategy: config.record_id_strategy,
        }
    }

    pub async fn process(&self, event: &ObjectCreatedEvent) -> Result<ProcessingOutcome> {
        if event.bucket != self.incoming.bucket() {
            return Err(Error::InvalidInput(format!(
                "event for bucket '{}' but processor reads from '{}'",
                event.bucket,
                self.incoming.bucket()
            )));
        }

        let body = match self
            .incoming
            .get_object_within(&event.key, self.max_file_size)
            .await
        {
            Ok(body) => body,
            Err(Error::NotFound(msg)) => {
                if self.quarantine.contains(&event.key).await? {
                    info!(key = %event.key, "Object already quarantined by an earlier run");
                    return Ok(ProcessingOutcome::AlreadyQuarantined {
                        key: event.key.clone(),
                    });
                }
                return Err(Error::NotFound(msg));
            }
            Err(e) => return Err(e),
        };

        let data = match body {
            ObjectBody::Data(data) => data,
            ObjectBody::Oversized { size } => {
                let reason = ValidationError::TooLarge {
                    size,
                    max: self.max_file_size,
                };
                return self.reject(event, reason).await;
            }
        };

        match self.validator.validate(&data) {
            Ok(payload) => self.record(event, &data, payload).await,
            Err(reason) => self.reject(event, reason).await,
        }
    }

    async fn record(
        &self,
        event: &ObjectCreatedEvent,
        data: &[u8],
        payload: ParsedPayload,
    ) -> Result<ProcessingOutcome> {
        let content_hash = format!("{:x}", Sha256::digest(data));
        let record = ProcessedRecord {
            record_id: self.record_id(event, &content_hash),
            file_name: event.key.clone(),
            file_size: data.len() as u64,
            source_bucket: event.bucket.clone(),
            content_hash,
            columns: payload.columns,
            row_count: payload.row_count,
            processed_at: Utc::now(),
        };

        self.records.put_record(&record).await?;

        info!(
            key = %event.key,
            record_id = %record.record_id,
            file_size = record.file_size,
            rows = record.row_count,
            "Recorded processed file"
        );
        Ok(ProcessingOutcome::Recorded(record))
    }

    async fn reject(
        &self,
        event: &ObjectCreatedEvent,
        reason: ValidationError,
    ) -> Result<ProcessingOutcome> {
        warn!(key = %event.key, reason = %reason, "File failed validation, quarantining");

        let quarantine_key = self
            .quarantine
            .isolate(self.incoming.as_ref(), &event.key)
            .await?;
        // Only remove the original once the copy is durable.
        self.incoming.delete_object(&event.key).await?;

        info!(
            key = %event.key,
            quarantine = %format!("s3://{}/{}", self.quarantine.bucket(), quarantine_key),
            "Moved file to quarantine"
        );
        Ok(ProcessingOutcome::Quarantined {
            key: event.key.clone(),
            quarantine_key,
            reason: reason.to_string(),
        })
    }

    fn record_id(&self, event: &ObjectCreatedEvent, content_hash: &str) -> String {
        match self.record_id_strategy {
            RecordIdStrategy::ContentDerived => {
                let name = format!("s3://{}/{}#{}", event.bucket, event.key, content_hash);
                Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
            }
            RecordIdStrategy::Random => Uuid::new_v4().to_string(),
        }
    }
}
