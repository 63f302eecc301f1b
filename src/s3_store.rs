use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::store::{content_type_for_key, BlobStore, FetchedObject, ObjectInfo, StoreError, StoreResult};
use crate::{MediaError, MediaResult};

/// S3-compatible store configuration from environment variables
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Empty for AWS proper; set for S3-compatible stores (MinIO, RustFS,
    /// DigitalOcean Spaces)
    pub endpoint_url: String,
    pub bucket: String,
    /// Path-style addressing, required by most S3-compatible stores
    pub path_style: bool,
}

impl S3Config {
    pub fn from_env() -> MediaResult<Self> {
        fn get_env(key: &str) -> MediaResult<String> {
            env::var(key)
                .map_err(|_| MediaError::invalid(format!("{} environment variable required", key)))
        }

        Ok(Self {
            region: get_env("MEDIA_S3_REGION")?,
            access_key_id: get_env("MEDIA_S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("MEDIA_S3_SECRET_ACCESS_KEY")?,
            endpoint_url: env::var("MEDIA_S3_ENDPOINT_URL").unwrap_or_default(),
            bucket: get_env("MEDIA_S3_BUCKET")?,
            path_style: true,
        })
    }
}

/// Production storage backend wrapping `aws-sdk-s3`.
///
/// Works against AWS S3 and S3-compatible stores via configurable endpoint
/// and path-style addressing. Every SDK failure is classified into the
/// closed [`StoreError`] set; the retry policy lives one layer up in the
/// consistency guard, so nothing here loops.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "media-ingest",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if !config.endpoint_url.is_empty() {
            loader = loader.endpoint_url(&config.endpoint_url);
        }
        let aws_config = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.path_style)
                .build(),
        );

        Self {
            client,
            bucket: config.bucket,
        }
    }

    pub async fn from_env() -> MediaResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }
}

/// Map an SDK failure to the closed store error set.
///
/// Transport-tier failures (the request may never have completed) are
/// `Transient`; service responses are split on the error code.
fn classify<E, R>(key: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => StoreError::transient(key, "request timed out"),
        SdkError::DispatchFailure(_) => StoreError::transient(key, "connection failure"),
        SdkError::ResponseError(_) => StoreError::transient(key, "malformed response"),
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or("unknown");
            let message = ctx.err().message().unwrap_or("");
            match code {
                "NoSuchKey" | "NotFound" | "404" => StoreError::not_found(key),
                "SlowDown" | "InternalError" | "ServiceUnavailable" | "RequestTimeout" => {
                    StoreError::transient(key, format!("{}: {}", code, message))
                }
                _ => StoreError::rejected(key, format!("{}: {}", code, message)),
            }
        }
        _ => StoreError::rejected(key, format!("{:?}", err)),
    }
}

#[async_trait]
impl BlobStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(AwsByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| classify(key, e))?;
        debug!(key, "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<FetchedObject> {
        let result = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_no_such_key() => {
                return Err(StoreError::not_found(key));
            }
            Err(e) => return Err(classify(key, e)),
        };

        let content_type = result
            .content_type
            .unwrap_or_else(|| content_type_for_key(key).to_string());
        let etag = result.e_tag;

        let bytes = result
            .body
            .collect()
            .await
            .map_err(|e| StoreError::transient(key, e.to_string()))?
            .into_bytes();

        Ok(FetchedObject {
            bytes,
            content_type,
            etag,
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_not_found() => Ok(false),
            Err(e) => Err(classify(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(key, e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| classify(prefix, e))?;

            if let Some(contents) = output.contents {
                for obj in contents {
                    let key = obj.key.unwrap_or_default();
                    let size_bytes = obj.size.unwrap_or(0) as u64;
                    let last_modified = obj
                        .last_modified
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                        .unwrap_or_else(Utc::now);

                    objects.push(ObjectInfo {
                        key,
                        size_bytes,
                        last_modified,
                    });
                }
            }

            if output.is_truncated.unwrap_or(false) {
                continuation_token = output.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }
}
