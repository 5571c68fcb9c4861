use crate::processor::validation::ValidationRules;
use crate::storage::memory::MemoryStorage;
use crate::storage::s3::{ObjectPresigner, ObjectStorage, S3Storage};
use crate::storage::{S3Config, S3Manager};
use common::Result;
use common::config::{RecordIdStrategy, Settings};
use std::sync::Arc;

/// Handles on the three stores the pipeline touches.
#[derive(Clone)]
pub struct StorageConfig {
    pub incoming: Arc<dyn ObjectStorage>,
    pub incoming_presigner: Arc<dyn ObjectPresigner>,
    pub quarantine: Arc<dyn ObjectStorage>,
    pub records: Arc<dyn ObjectStorage>,
    pub s3_manager: Option<Arc<S3Manager>>,
}

impl StorageConfig {
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let s3_manager = Arc::new(S3Manager::new(S3Config::from_settings(&settings.storage)));

        let incoming = Arc::new(
            S3Storage::new(s3_manager.clone(), &settings.storage.incoming_bucket).await?,
        );

        Ok(Self {
            incoming: incoming.clone(),
            incoming_presigner: incoming,
            quarantine: Arc::new(
                S3Storage::new(s3_manager.clone(), &settings.storage.quarantine_bucket).await?,
            ),
            records: Arc::new(
                S3Storage::new(s3_manager.clone(), &settings.storage.records_bucket).await?,
            ),
            s3_manager: Some(s3_manager),
        })
    }

    /// In-process stores named after the configured buckets.
    pub fn in_memory(settings: &Settings) -> Self {
        let incoming = Arc::new(MemoryStorage::new(&settings.storage.incoming_bucket));

        Self {
            incoming: incoming.clone(),
            incoming_presigner: incoming,
            quarantine: Arc::new(MemoryStorage::new(&settings.storage.quarantine_bucket)),
            records: Arc::new(MemoryStorage::new(&settings.storage.records_bucket)),
            s3_manager: None,
        }
    }

    /// Checks that every configured bucket is reachable.
    pub async fn verify(&self) -> Result<()> {
        let Some(s3_manager) = &self.s3_manager else {
            return Ok(());
        };

        for bucket in [
            self.incoming.bucket(),
            self.quarantine.bucket(),
            self.records.bucket(),
        ] {
            s3_manager.verify_bucket_exists(bucket).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub rules: ValidationRules,
    pub record_id_strategy: RecordIdStrategy,
    pub quarantine_prefix: String,
}

impl ProcessorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rules: ValidationRules {
                max_file_size: settings.processor.max_file_size,
                required_columns: settings.processor.required_columns.clone(),
            },
            record_id_strategy: settings.processor.record_id_strategy,
            quarantine_prefix: settings.storage.quarantine_prefix.clone(),
        }
    }
}
