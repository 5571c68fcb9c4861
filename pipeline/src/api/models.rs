use crate::models::PresignedHandle;
use crate::processor::ProcessingOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Request models
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub file_name: Option<String>,
}

// Response models
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_url: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

impl From<PresignedHandle> for UploadResponse {
    fn from(handle: PresignedHandle) -> Self {
        Self {
            upload_url: handle.url,
            key: handle.object_key,
            expires_at: handle.expiry,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub download_url: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

impl From<PresignedHandle> for DownloadResponse {
    fn from(handle: PresignedHandle) -> Self {
        Self {
            download_url: handle.url,
            key: handle.object_key,
            expires_at: handle.expiry,
        }
    }
}

/// Per-object result of a notification delivered to `POST /events`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub bucket: String,
    pub key: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResult {
    pub fn new(bucket: String, key: String, result: &common::Result<ProcessingOutcome>) -> Self {
        let mut out = Self {
            bucket,
            key,
            status: "failed",
            record_id: None,
            quarantine_key: None,
            error: None,
        };
        match result {
            Ok(ProcessingOutcome::Recorded(record)) => {
                out.status = "recorded";
                out.record_id = Some(record.record_id.clone());
            }
            Ok(ProcessingOutcome::Quarantined { quarantine_key, .. }) => {
                out.status = "quarantined";
                out.quarantine_key = Some(quarantine_key.clone());
            }
            Ok(ProcessingOutcome::AlreadyQuarantined { .. }) => {
                out.status = "already_quarantined";
            }
            Err(e) => out.error = Some(e.to_string()),
        }
        out
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}
