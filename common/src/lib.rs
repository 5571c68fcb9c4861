use aws_sdk_s3::primitives::ByteStreamError;
use aws_smithy_runtime_api::client::result::CreateUnhandledError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use thiserror::Error;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("S3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Forbidden - Access denied")]
    Forbidden,

    #[error("Invocation timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("ByteStream error: {0}")]
    ByteStream(#[from] ByteStreamError),

    #[error("Presigning error: {0}")]
    Presign(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Alert delivery error: {0}")]
    Alert(String),
}

impl Error {
    /// Whether a fresh attempt of the same operation may succeed.
    ///
    /// Infrastructure errors are retryable; caller mistakes and
    /// misconfiguration are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::InvalidInput(_)
                | Error::Forbidden
                | Error::RateLimit
                | Error::Config(_)
        )
    }
}

// Implement From for various SdkError types
impl<E: std::fmt::Debug + CreateUnhandledError> From<SdkError<E, Response>> for Error {
    fn from(err: SdkError<E, Response>) -> Self {
        Error::AwsSdk(format!("{:?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_are_retryable() {
        assert!(Error::Storage("unreachable".into()).is_retryable());
        assert!(Error::Timeout(30).is_retryable());
        assert!(Error::NotFound("incoming/a.csv".into()).is_retryable());
        assert!(Error::AwsSdk("dispatch failure".into()).is_retryable());
    }

    #[test]
    fn test_caller_errors_are_not_retryable() {
        assert!(!Error::InvalidInput("empty key".into()).is_retryable());
        assert!(!Error::Forbidden.is_retryable());
        assert!(!Error::RateLimit.is_retryable());
    }
}
