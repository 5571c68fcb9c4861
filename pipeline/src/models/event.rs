use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// Reference to a newly created object. The payload is never inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub key: String,
}

impl ObjectCreatedEvent {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

impl std::fmt::Display for ObjectCreatedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Bucket notification envelope as delivered by S3-compatible stores.
#[derive(Debug, Deserialize)]
pub struct S3EventNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct S3Object {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl S3EventNotification {
    /// Object-created references carried by this notification, with keys
    /// decoded. Records for other event types are dropped.
    pub fn into_events(self) -> Vec<ObjectCreatedEvent> {
        self.records
            .into_iter()
            .filter(|record| match &record.event_name {
                Some(name) => name.starts_with("ObjectCreated:") || name.starts_with("s3:ObjectCreated:"),
                None => true,
            })
            .map(|record| ObjectCreatedEvent {
                bucket: record.s3.bucket.name,
                key: decode_event_key(&record.s3.object.key),
            })
            .collect()
    }
}

/// Keys in notifications use `+` for space and `%XX` escapes. Any other
/// character, `&` and `=` included, is part of the key.
pub fn decode_event_key(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
