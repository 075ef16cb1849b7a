//! S3-compatible object storage backend.
//!
//! [`S3Backend`] implements [`BlobBackend`] using the `object_store` crate,
//! supporting any S3-compatible endpoint that honours conditional requests:
//! AWS S3, MinIO, Ceph, etc.
//!
//! A container is a key prefix inside the bucket, so it always exists and
//! `ensure_container` does nothing. Conditional puts map to
//! `If-None-Match: *` (`PutMode::Create`) and `If-Match` (`PutMode::Update`).
//! `object_store` has no conditional delete, so `IfMatch` deletes go through
//! a [`ConditionalDelete`], by default `DeleteObject` with `If-Match` sent via
//! the AWS SDK.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use bytes::Bytes;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use tracing::{debug, instrument};

use quill_core::error::QuillError;
use quill_core::storage::{BlobBackend, Condition, Outcome};
use quill_core::types::{Container, ETag};
use quill_core::Result;

/// Where an `s3://` URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
struct S3Location {
    bucket: String,
    prefix: String,
    region: Option<String>,
    endpoint: Option<String>,
}

impl S3Location {
    /// Parse `s3://bucket/prefix?region=..&endpoint=..`.
    fn parse(uri: &str) -> Result<Self> {
        let stripped = uri
            .strip_prefix("s3://")
            .ok_or_else(|| QuillError::config(format!("S3 URI must start with 's3://': {uri}")))?;

        let (path, query) = match stripped.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (stripped, None),
        };
        let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
        if bucket.is_empty() {
            return Err(QuillError::config(format!(
                "S3 URI must include a bucket name: {uri}"
            )));
        }

        let mut location = Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            region: None,
            endpoint: None,
        };
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            match pair.split_once('=') {
                Some(("region", value)) => location.region = Some(value.to_string()),
                Some(("endpoint", value)) => location.endpoint = Some(value.to_string()),
                _ => debug!(param = %pair, "Ignoring unknown S3 URI parameter"),
            }
        }
        Ok(location)
    }
}

/// Deletes an object only while its ETag still matches.
///
/// Must be atomic on the service side. A 404 maps to [`Outcome::NotFound`],
/// a 412 to [`Outcome::PreconditionFailed`].
#[async_trait]
pub trait ConditionalDelete: Send + Sync {
    async fn delete_if_match(&self, path: &ObjectPath, etag: &ETag) -> Result<Outcome<()>>;
}

/// [`ConditionalDelete`] issuing `DeleteObject` with an `If-Match` header.
pub struct SdkConditionalDelete {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl SdkConditionalDelete {
    /// Build a client from the standard AWS environment, overriding region
    /// and endpoint when given.
    pub async fn new(bucket: &str, region: Option<&str>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let shared = loader.load().await;

        let mut config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(config.build()),
            bucket: bucket.to_string(),
        }
    }
}

/// Classify the HTTP status of a rejected conditional delete. `None` means
/// the failure is a fault, not an expected outcome.
fn delete_status_outcome(status: u16) -> Option<Outcome<()>> {
    match status {
        404 => Some(Outcome::NotFound),
        412 => Some(Outcome::PreconditionFailed),
        409 => Some(Outcome::Conflict),
        _ => None,
    }
}

#[async_trait]
impl ConditionalDelete for SdkConditionalDelete {
    async fn delete_if_match(&self, path: &ObjectPath, etag: &ETag) -> Result<Outcome<()>> {
        let sent = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(path.as_ref())
            .if_match(etag.to_string())
            .send()
            .await;
        match sent {
            Ok(_) => Ok(Outcome::Done(())),
            Err(err) => {
                let status = err.raw_response().map(|r| r.status().as_u16());
                match status.and_then(delete_status_outcome) {
                    Some(outcome) => {
                        debug!(?status, ?outcome, "conditional delete rejected");
                        Ok(outcome)
                    }
                    None => Err(QuillError::storage(
                        format!("S3 conditional delete failed for {path}"),
                        err,
                    )),
                }
            }
        }
    }
}

/// A [`BlobBackend`] backed by any S3-compatible object storage.
///
/// Configured from a URI like `s3://bucket/prefix?region=eu-west-1`.
/// Credentials come from the standard `AWS_*` environment variables.
pub struct S3Backend {
    store: Arc<dyn ObjectStore>,
    deleter: Arc<dyn ConditionalDelete>,
    prefix: String,
}

impl S3Backend {
    /// Create a new `S3Backend` from an S3 URI.
    ///
    /// # URI Format
    ///
    /// `s3://bucket/prefix?region=us-east-1&endpoint=http://minio:9000`
    pub async fn new(uri: &str) -> Result<Self> {
        let location = S3Location::parse(uri)?;

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&location.bucket)
            .with_conditional_put(S3ConditionalPut::ETagMatch);
        if let Some(region) = &location.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &location.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| QuillError::storage(format!("Failed to create S3 client for {uri}"), e))?;

        let deleter = SdkConditionalDelete::new(
            &location.bucket,
            location.region.as_deref(),
            location.endpoint.as_deref(),
        )
        .await;

        debug!(bucket = %location.bucket, prefix = %location.prefix, "S3Backend initialised");

        Ok(Self::with_store(
            Arc::new(store),
            Arc::new(deleter),
            location.prefix,
        ))
    }

    /// Wrap an existing [`ObjectStore`], placing containers under `prefix`.
    /// `deleter` must address the same objects as `store`.
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        deleter: Arc<dyn ConditionalDelete>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            deleter,
            prefix: prefix.into(),
        }
    }

    fn full_path(&self, container: &Container, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(format!("{container}/{key}"))
        } else {
            ObjectPath::from(format!("{}/{container}/{key}", self.prefix))
        }
    }
}

fn put_mode(condition: &Condition) -> PutMode {
    match condition {
        Condition::None => PutMode::Overwrite,
        Condition::IfNotExists => PutMode::Create,
        Condition::IfMatch(etag) => PutMode::Update(UpdateVersion {
            e_tag: Some(etag.to_string()),
            version: None,
        }),
    }
}

#[async_trait]
impl BlobBackend for S3Backend {
    #[instrument(skip(self), fields(container = %container, key = %key))]
    async fn get(&self, container: &Container, key: &str) -> Result<Option<(Bytes, ETag)>> {
        let path = self.full_path(container, key);
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(QuillError::storage(format!("S3 get failed for {key}"), e)),
        };
        let etag = result
            .meta
            .e_tag
            .clone()
            .map(ETag::from_backend)
            .ok_or_else(|| QuillError::storage_msg(format!("S3 returned no ETag for {key}")))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| QuillError::storage(format!("S3 get bytes failed for {key}"), e))?;
        Ok(Some((bytes, etag)))
    }

    #[instrument(skip(self, data), fields(container = %container, key = %key, size = data.len()))]
    async fn put(
        &self,
        container: &Container,
        key: &str,
        data: Bytes,
        condition: &Condition,
    ) -> Result<Outcome<ETag>> {
        let path = self.full_path(container, key);
        let opts = PutOptions {
            mode: put_mode(condition),
            ..Default::default()
        };
        match self
            .store
            .put_opts(&path, PutPayload::from(data), opts)
            .await
        {
            Ok(result) => {
                let etag = result.e_tag.map(ETag::from_backend).ok_or_else(|| {
                    QuillError::storage_msg(format!("S3 put returned no ETag for {key}"))
                })?;
                debug!(etag = %etag, "put");
                Ok(Outcome::Done(etag))
            }
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => {
                debug!(condition = ?condition, "put: precondition failed");
                Ok(Outcome::PreconditionFailed)
            }
            // If-Match against a deleted object comes back as 404 on some stores
            Err(object_store::Error::NotFound { .. })
                if matches!(condition, Condition::IfMatch(_)) =>
            {
                Ok(Outcome::PreconditionFailed)
            }
            Err(e) => Err(QuillError::storage(format!("S3 put failed for {key}"), e)),
        }
    }

    #[instrument(skip(self), fields(container = %container, key = %key))]
    async fn delete(
        &self,
        container: &Container,
        key: &str,
        condition: &Condition,
    ) -> Result<Outcome<()>> {
        let path = self.full_path(container, key);
        match condition {
            Condition::IfMatch(etag) => self.deleter.delete_if_match(&path, etag).await,
            Condition::IfNotExists => Err(QuillError::Unsupported {
                message: format!("Deleting {key} only if absent is meaningless"),
            }),
            // S3 delete is idempotent and does not report a missing key
            Condition::None => match self.store.delete(&path).await {
                Ok(()) => Ok(Outcome::Done(())),
                Err(object_store::Error::NotFound { .. }) => Ok(Outcome::NotFound),
                Err(e) => Err(QuillError::storage(format!("S3 delete failed for {key}"), e)),
            },
        }
    }

    #[instrument(skip(self), fields(container = %container))]
    async fn ensure_container(&self, container: &Container) -> Result<()> {
        debug!("Containers are key prefixes; nothing to create");
        Ok(())
    }
}
