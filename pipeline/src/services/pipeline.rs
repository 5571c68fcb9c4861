use crate::handles::{DownloadHandleIssuer, HandleConfig, UploadHandleIssuer};
use crate::models::{ObjectCreatedEvent, PresignedHandle, ProcessedRecord, S3EventNotification};
use crate::processor::{
    FileProcessor, ProcessingOutcome, ProcessorConfig, RecordReader, S3RecordStore, StorageConfig,
};
use crate::services::invoker::{InvocationPolicy, Invoker};
use common::Result;
use common::config::Settings;
use notification::{FailureMonitor, channel_from_settings};
use std::sync::Arc;
use tracing::info;

/// Every pipeline component, wired from one `Settings`.
pub struct PipelineService {
    uploads: UploadHandleIssuer,
    downloads: DownloadHandleIssuer,
    records: Arc<dyn RecordReader>,
    invoker: Invoker,
    monitor: Arc<FailureMonitor>,
}

impl PipelineService {
    /// S3-backed service. Fails if any configured bucket is unreachable.
    pub async fn new(settings: &Settings) -> Result<Self> {
        let storage = StorageConfig::from_settings(settings).await?;
        storage.verify().await?;
        Self::from_storage(settings, storage)
    }

    pub fn from_storage(settings: &Settings, storage: StorageConfig) -> Result<Self> {
        let record_store = Arc::new(S3RecordStore::new(
            storage.records.clone(),
            &settings.storage.records_prefix,
        ));
        let processor = FileProcessor::new(
            storage.incoming.clone(),
            record_store.clone(),
            storage.quarantine.clone(),
            ProcessorConfig::from_settings(settings),
        );

        let channel = channel_from_settings(&settings.monitor)?;
        let monitor = Arc::new(FailureMonitor::from_settings(&settings.monitor, channel));
        let invoker = Invoker::new(
            Arc::new(processor),
            monitor.clone(),
            InvocationPolicy::from_settings(&settings.processor),
        );

        let handle_config = HandleConfig::from_settings(&settings.handles);

        info!(
            incoming = %storage.incoming.bucket(),
            quarantine = %storage.quarantine.bucket(),
            records = %storage.records.bucket(),
            "Pipeline service initialised"
        );

        Ok(Self {
            uploads: UploadHandleIssuer::new(storage.incoming_presigner.clone(), handle_config),
            downloads: DownloadHandleIssuer::new(
                storage.incoming.clone(),
                storage.incoming_presigner,
                handle_config,
            ),
            records: record_store,
            invoker,
            monitor,
        })
    }

    pub fn monitor(&self) -> Arc<FailureMonitor> {
        self.monitor.clone()
    }

    pub async fn issue_upload_handle(&self, file_name: &str) -> Result<PresignedHandle> {
        self.uploads.issue_upload_handle(file_name).await
    }

    pub async fn issue_download_handle(&self, file_name: &str) -> Result<PresignedHandle> {
        self.downloads.issue_download_handle(file_name).await
    }

    pub async fn list_records(&self) -> Result<Vec<ProcessedRecord>> {
        self.records.list_records().await
    }

    pub async fn process(&self, event: &ObjectCreatedEvent) -> Result<ProcessingOutcome> {
        self.invoker.invoke(event).await
    }

    /// One independent invocation per object-created record.
    pub async fn handle_notification(
        &self,
        notification: S3EventNotification,
    ) -> Vec<(ObjectCreatedEvent, Result<ProcessingOutcome>)> {
        let events = notification.into_events();
        info!(count = events.len(), "Received storage notification");
        self.invoker.invoke_all(events).await
    }
}
