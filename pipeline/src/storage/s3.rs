use crate::models::HandleMethod;
use crate::storage::S3Manager;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_smithy_runtime_api::client::orchestrator::{HttpRequest, HttpResponse};
use aws_smithy_runtime_api::client::result::CreateUnhandledError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use bytes::Bytes;
use common::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Result of a size-capped read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Data(Vec<u8>),
    /// The object is larger than the cap. Its body was not read.
    Oversized { size: u64 },
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()>;
    /// Fails with `Error::NotFound` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete_object(&self, key: &str) -> Result<()>;
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;
    async fn check_file_exists(&self, key: &str) -> Result<bool>;
    fn bucket(&self) -> &str;

    /// Like `get_object`, but leaves the body unread when the object is
    /// larger than `max_bytes`.
    async fn get_object_within(&self, key: &str, max_bytes: u64) -> Result<ObjectBody> {
        let data = self.get_object(key).await?;
        let size = data.len() as u64;
        if size > max_bytes {
            return Ok(ObjectBody::Oversized { size });
        }
        Ok(ObjectBody::Data(data))
    }

    /// Copies `source_key` from `source` into this store under `key`.
    async fn copy_from(&self, source: &dyn ObjectStorage, source_key: &str, key: &str) -> Result<()> {
        let data = source.get_object(source_key).await?;
        self.put_object(key, &data).await
    }
}

#[async_trait]
pub trait ObjectPresigner: Send + Sync {
    async fn presign(&self, method: HandleMethod, key: &str, expires_in: Duration)
    -> Result<String>;
}

/// Characters left as-is in an `x-amz-copy-source` key.
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, utf8_percent_encode(key, COPY_SOURCE_KEY))
}

/// Service responses become `Error::S3`; dispatch and timeout failures
/// become `Error::AwsSdk`.
fn s3_error<E>(err: SdkError<E, HttpResponse>) -> common::Error
where
    E: std::fmt::Debug + CreateUnhandledError,
    aws_sdk_s3::Error: From<SdkError<E, HttpResponse>>,
{
    if matches!(err, SdkError::ServiceError(_)) {
        common::Error::S3(aws_sdk_s3::Error::from(err))
    } else {
        common::Error::from(err)
    }
}

// Implement for S3
pub struct S3Storage {
    bucket: String,
    client: Arc<S3Client>,
}

impl S3Storage {
    async fn fetch(&self, key: &str) -> Result<GetObjectOutput> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref err) if err.err().is_no_such_key() => {
                    common::Error::NotFound(format!(
                        "Object {} not found in bucket {}",
                        key, self.bucket
                    ))
                }
                other => s3_error(other),
            })
    }

    pub async fn new(s3_manager: Arc<S3Manager>, bucket: &str) -> Result<Self> {
        let client = s3_manager.get_client(bucket).await?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let body = Bytes::copy_from_slice(data);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .map_err(s3_error)?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self.fetch(key).await?;
        Ok(response.body.collect().await?.into_bytes().to_vec())
    }

    async fn get_object_within(&self, key: &str, max_bytes: u64) -> Result<ObjectBody> {
        let response = self.fetch(key).await?;

        if let Some(size) = response.content_length().and_then(|l| u64::try_from(l).ok()) {
            if size > max_bytes {
                return Ok(ObjectBody::Oversized { size });
            }
        }

        let data = response.body.collect().await?.into_bytes().to_vec();
        let size = data.len() as u64;
        if size > max_bytes {
            return Ok(ObjectBody::Oversized { size });
        }
        Ok(ObjectBody::Data(data))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_error)?;

        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(s3_error)?;

            if let Some(contents) = response.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        objects.push(key);
                    }
                }
            }

            continuation_token = response.next_continuation_token;
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    async fn check_file_exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(false),
            Err(e) => Err(s3_error(e)),
        }
    }

    /// Server-side copy. `source` must be a bucket on the same endpoint.
    async fn copy_from(&self, source: &dyn ObjectStorage, source_key: &str, key: &str) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(copy_source(source.bucket(), source_key))
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_error)?;

        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectPresigner for S3Storage {
    async fn presign(
        &self,
        method: HandleMethod,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| common::Error::Presign(e.to_string()))?;

        // SigV4 dates have one-second resolution; the signed grant id keeps
        // two handles minted within the same second distinct.
        let grant_id = Uuid::new_v4().to_string();

        let request = match method {
            HandleMethod::Put => self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .customize()
                .mutate_request(with_grant_id(grant_id))
                .presigned(config)
                .await
                .map_err(|e| common::Error::Presign(e.to_string()))?,
            HandleMethod::Get => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .customize()
                .mutate_request(with_grant_id(grant_id))
                .presigned(config)
                .await
                .map_err(|e| common::Error::Presign(e.to_string()))?,
        };

        Ok(request.uri().to_string())
    }
}

fn with_grant_id(grant_id: String) -> impl Fn(&mut HttpRequest) + Send + Sync + 'static {
    move |req: &mut HttpRequest| {
        let separator = if req.uri().contains('?') { '&' } else { '?' };
        let uri = format!("{}{}x-grant-id={}", req.uri(), separator, grant_id);
        if let Err(e) = req.set_uri(uri) {
            warn!(error = %e, "Could not attach grant id to presigned request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::S3Config;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use url::Url;

    async fn static_storage() -> S3Storage {
        let manager = S3Manager::new(S3Config {
            endpoint: Some("http://localhost:9000".into()),
            region: "us-east-1".into(),
            access_key: Some("AKIDEXAMPLE".into()),
            secret_key: Some("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into()),
            force_path_style: true,
        });
        S3Storage::new(Arc::new(manager), "incoming").await.unwrap()
    }

    fn query_value(url: &str, name: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_presigned_urls_in_same_second_have_distinct_signatures() {
        let storage = static_storage().await;
        let expires = Duration::from_secs(300);

        let first = storage.presign(HandleMethod::Put, "a.csv", expires).await.unwrap();
        let second = storage.presign(HandleMethod::Put, "a.csv", expires).await.unwrap();

        assert!(first.starts_with("http://localhost:9000/incoming/a.csv?"));
        assert_ne!(
            query_value(&first, "X-Amz-Signature"),
            query_value(&second, "X-Amz-Signature")
        );
        assert_ne!(query_value(&first, "x-grant-id"), query_value(&second, "x-grant-id"));
    }

    #[tokio::test]
    async fn test_grant_id_is_covered_by_signature() {
        let storage = static_storage().await;
        let url = storage
            .presign(HandleMethod::Get, "a.csv", Duration::from_secs(60))
            .await
            .unwrap();

        let grant = url.find("x-grant-id=").unwrap();
        let signature = url.find("X-Amz-Signature=").unwrap();
        assert!(grant < signature);
        assert!(Uuid::parse_str(&query_value(&url, "x-grant-id")).is_ok());
    }

    #[test]
    fn test_dispatch_failures_map_to_retryable_sdk_error() {
        let err: SdkError<GetObjectError, HttpResponse> =
            SdkError::construction_failure("missing bucket");

        let mapped = s3_error(err);

        assert!(matches!(mapped, common::Error::AwsSdk(_)));
        assert!(mapped.is_retryable());
    }

    #[test]
    fn test_copy_source_encodes_key() {
        assert_eq!(
            copy_source("incoming", "my report+1.csv"),
            "incoming/my%20report%2B1.csv"
        );
        assert_eq!(copy_source("incoming", "2024/a_b-c.csv"), "incoming/2024/a_b-c.csv");
    }
}
