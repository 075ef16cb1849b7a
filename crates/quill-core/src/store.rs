//! Versioned text storage with optimistic concurrency.
//!
//! [`BlobTextStore`] maps each [`TextId`] to one object in a container of a
//! [`BlobBackend`]. Reads return the object's ETag alongside its content;
//! conditional writers hand that ETag back so the backend can reject the
//! write if someone else got there first.
//!
//! The container is provisioned lazily. A write that reports a missing
//! container triggers one `ensure_container` call and exactly one retry.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::error::QuillError;
use crate::storage::{BlobBackend, Condition, Outcome};
use crate::types::{Container, ETag, TextId, VersionedText};
use crate::Result;

/// Read-modify-write safe storage for text resources.
///
/// Expected conditions (missing object, stale version, concurrent writer)
/// are reported through the return value. `Err` means a backend fault.
#[async_trait]
pub trait VersionedTextStore: Send + Sync {
    /// Current content and version, or `None` if nothing is stored at `id`.
    async fn read(&self, id: &TextId) -> Result<Option<VersionedText>>;

    /// Write `text` regardless of what is currently stored.
    async fn create_or_update(&self, id: &TextId, text: &str) -> Result<()>;

    /// Write `text` only if nothing is stored at `id`.
    async fn try_create(&self, id: &TextId, text: &str) -> Result<bool>;

    /// Write `text` only if the stored version is still `version`.
    async fn try_update(&self, id: &TextId, text: &str, version: &ETag) -> Result<bool>;

    /// Delete only if the stored version is still `version`.
    async fn try_delete(&self, id: &TextId, version: &ETag) -> Result<bool>;

    /// Delete whatever is stored at `id`. Absent is not an error.
    async fn delete_if_exists(&self, id: &TextId) -> Result<()>;
}

/// A [`VersionedTextStore`] backed by one container of a [`BlobBackend`].
///
/// Holds no mutable state, so a single instance can be shared freely
/// across tasks.
#[derive(Clone)]
pub struct BlobTextStore {
    backend: Arc<dyn BlobBackend>,
    container: Container,
}

impl BlobTextStore {
    /// Bind `backend` to the container every text of this store lives in.
    pub fn new(backend: Arc<dyn BlobBackend>, container: Container) -> Self {
        Self { backend, container }
    }

    /// The container this store reads and writes.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Put once; on a missing container, ensure it and put exactly once more.
    async fn put_with_container_retry(
        &self,
        id: &TextId,
        data: Bytes,
        condition: &Condition,
    ) -> Result<Outcome<ETag>> {
        let first = self
            .backend
            .put(&self.container, id.as_str(), data.clone(), condition)
            .await?;
        if first != Outcome::NotFound {
            return Ok(first);
        }

        info!(container = %self.container, "Container missing, creating it");
        self.backend.ensure_container(&self.container).await?;
        let retry = self
            .backend
            .put(&self.container, id.as_str(), data, condition)
            .await?;
        if retry == Outcome::NotFound {
            warn!(container = %self.container, id = %id, "Container still missing after create");
        }
        Ok(retry)
    }

    /// Collapse a conditional write outcome into "applied or not".
    fn conditional_applied(id: &TextId, outcome: Outcome<ETag>) -> bool {
        match outcome {
            Outcome::Done(etag) => {
                debug!(id = %id, etag = %etag, "Conditional write applied");
                true
            }
            other => {
                debug!(id = %id, outcome = ?other, "Conditional write rejected");
                false
            }
        }
    }
}

#[async_trait]
impl VersionedTextStore for BlobTextStore {
    #[instrument(skip(self, id), fields(container = %self.container, id = %id))]
    async fn read(&self, id: &TextId) -> Result<Option<VersionedText>> {
        let Some((data, etag)) = self.backend.get(&self.container, id.as_str()).await? else {
            debug!("Text absent");
            return Ok(None);
        };
        let content = String::from_utf8(data.to_vec()).map_err(|source| QuillError::InvalidText {
            key: format!("{}/{}", self.container, id),
            source,
        })?;
        debug!(etag = %etag, size = content.len(), "Read text");
        Ok(Some(VersionedText::new(content, etag)))
    }

    #[instrument(skip(self, id, text), fields(container = %self.container, id = %id, size = text.len()))]
    async fn create_or_update(&self, id: &TextId, text: &str) -> Result<()> {
        let data = Bytes::copy_from_slice(text.as_bytes());
        match self
            .put_with_container_retry(id, data, &Condition::None)
            .await?
        {
            Outcome::Done(etag) => {
                debug!(etag = %etag, "Wrote text");
                Ok(())
            }
            Outcome::NotFound => Err(QuillError::NotFound {
                key: format!("{}/{}", self.container, id),
            }),
            other => Err(QuillError::storage_msg(format!(
                "Unconditional write to {}/{} reported {:?}",
                self.container, id, other
            ))),
        }
    }

    #[instrument(skip(self, id, text), fields(container = %self.container, id = %id, size = text.len()))]
    async fn try_create(&self, id: &TextId, text: &str) -> Result<bool> {
        self.backend.ensure_container(&self.container).await?;
        let data = Bytes::copy_from_slice(text.as_bytes());
        let outcome = self
            .put_with_container_retry(id, data, &Condition::IfNotExists)
            .await?;
        Ok(Self::conditional_applied(id, outcome))
    }

    #[instrument(skip(self, id, text, version), fields(container = %self.container, id = %id, version = %version))]
    async fn try_update(&self, id: &TextId, text: &str, version: &ETag) -> Result<bool> {
        let data = Bytes::copy_from_slice(text.as_bytes());
        let outcome = self
            .put_with_container_retry(id, data, &Condition::IfMatch(version.clone()))
            .await?;
        Ok(Self::conditional_applied(id, outcome))
    }

    #[instrument(skip(self, id, version), fields(container = %self.container, id = %id, version = %version))]
    async fn try_delete(&self, id: &TextId, version: &ETag) -> Result<bool> {
        // Already deleted, updated by someone else, or the container is gone.
        let outcome = self
            .backend
            .delete(&self.container, id.as_str(), &Condition::IfMatch(version.clone()))
            .await?;
        debug!(outcome = ?outcome, "Conditional delete");
        Ok(outcome.is_done())
    }

    #[instrument(skip(self, id), fields(container = %self.container, id = %id))]
    async fn delete_if_exists(&self, id: &TextId) -> Result<()> {
        match self
            .backend
            .delete(&self.container, id.as_str(), &Condition::None)
            .await?
        {
            Outcome::Done(()) => {
                debug!("Deleted text");
                Ok(())
            }
            Outcome::NotFound => {
                debug!("Delete: already absent");
                Ok(())
            }
            other => Err(QuillError::storage_msg(format!(
                "Unconditional delete of {}/{} reported {:?}",
                self.container, id, other
            ))),
        }
    }
}
