//! In-process storage backend for tests and ephemeral stores.
//!
//! [`MemoryBackend`] keeps every container in a `HashMap` behind a single
//! mutex, so each conditional write is evaluated and applied atomically.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, instrument};

use quill_core::error::QuillError;
use quill_core::storage::{BlobBackend, Condition, Outcome};
use quill_core::types::{Container, ETag};
use quill_core::Result;

type Objects = HashMap<String, (Bytes, ETag)>;

/// A [`BlobBackend`] held entirely in memory.
///
/// Every successful write issues a fresh random ETag, so rewriting identical
/// content still changes the version.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    containers: Mutex<HashMap<Container, Objects>>,
}

impl MemoryBackend {
    /// An empty backend with no containers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a container and everything in it, as an operator deleting it
    /// out of band would. Returns whether it existed.
    pub fn drop_container(&self, container: &Container) -> Result<bool> {
        Ok(self.lock()?.remove(container).is_some())
    }

    /// Whether `container` has been created and not dropped since.
    pub fn container_exists(&self, container: &Container) -> Result<bool> {
        Ok(self.lock()?.contains_key(container))
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Container, Objects>>> {
        self.containers.lock().map_err(|e| QuillError::Internal {
            message: format!("MemoryBackend lock poisoned: {e}"),
        })
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    #[instrument(skip(self), fields(container = %container, key = %key))]
    async fn get(&self, container: &Container, key: &str) -> Result<Option<(Bytes, ETag)>> {
        let containers = self.lock()?;
        let found = containers
            .get(container)
            .and_then(|objects| objects.get(key))
            .cloned();
        debug!(found = found.is_some(), "get");
        Ok(found)
    }

    #[instrument(skip(self, data), fields(container = %container, key = %key, size = data.len()))]
    async fn put(
        &self,
        container: &Container,
        key: &str,
        data: Bytes,
        condition: &Condition,
    ) -> Result<Outcome<ETag>> {
        let mut containers = self.lock()?;
        let Some(objects) = containers.get_mut(container) else {
            debug!("put: container missing");
            return Ok(Outcome::NotFound);
        };

        let current = objects.get(key).map(|(_, etag)| etag);
        if !condition.is_satisfied_by(current) {
            debug!(condition = ?condition, "put: precondition failed");
            return Ok(Outcome::PreconditionFailed);
        }

        let etag = ETag::generate();
        objects.insert(key.to_string(), (data, etag.clone()));
        debug!(etag = %etag, "put");
        Ok(Outcome::Done(etag))
    }

    #[instrument(skip(self), fields(container = %container, key = %key))]
    async fn delete(
        &self,
        container: &Container,
        key: &str,
        condition: &Condition,
    ) -> Result<Outcome<()>> {
        let mut containers = self.lock()?;
        let Some(objects) = containers.get_mut(container) else {
            return Ok(Outcome::NotFound);
        };

        let Some((_, current)) = objects.get(key) else {
            return Ok(Outcome::NotFound);
        };
        if !condition.is_satisfied_by(Some(current)) {
            debug!(condition = ?condition, "delete: precondition failed");
            return Ok(Outcome::PreconditionFailed);
        }

        objects.remove(key);
        debug!("delete");
        Ok(Outcome::Done(()))
    }

    #[instrument(skip(self), fields(container = %container))]
    async fn ensure_container(&self, container: &Container) -> Result<()> {
        self.lock()?.entry(container.clone()).or_default();
        Ok(())
    }
}
