mod event;
mod handle;
mod record;

pub use event::{ObjectCreatedEvent, S3EventNotification};
pub use handle::{HandleMethod, ObjectKey, PresignedHandle};
pub use record::ProcessedRecord;
