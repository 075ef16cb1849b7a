//! Filesystem-backed storage backend for single-node use and development.
//!
//! [`LocalBackend`] maps a container to a directory under `base_dir` and an
//! object to a file inside it. Each file starts with the object's ETag on
//! its own line, followed by the raw content bytes. Writes land in a temp
//! file that is renamed into place, so readers never see a partial object.
//!
//! Conditional mutations are serialised by an in-process lock. Two
//! processes sharing one directory do not get conditional-write atomicity.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use quill_core::error::QuillError;
use quill_core::storage::{BlobBackend, Condition, Outcome};
use quill_core::types::{Container, ETag};
use quill_core::Result;

/// A [`BlobBackend`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    base_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at the given directory.
    ///
    /// The directory is created if it does not exist. Containers inside it
    /// are not; they appear on `ensure_container`.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            QuillError::storage(
                format!("Failed to create base directory: {}", base_dir.display()),
                e,
            )
        })?;
        debug!(base_dir = %base_dir.display(), "LocalBackend initialised");
        Ok(Self {
            base_dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Return the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn container_dir(&self, container: &Container) -> PathBuf {
        self.base_dir.join(container.as_str())
    }

    /// Resolve a key inside its container.
    ///
    /// Only keys already in normal form are accepted: plain segments joined
    /// by single `/`. Anything the filesystem would rewrite (`a/./b`, `a/`,
    /// `a//b`) is refused so that two distinct keys never share one file.
    fn object_path(&self, container: &Container, key: &str) -> Result<PathBuf> {
        let rejected = || {
            QuillError::config(format!(
                "Key '{key}' is not a normalized relative path inside the container"
            ))
        };
        let relative = Path::new(key);
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_string_lossy()),
                _ => return Err(rejected()),
            }
        }
        if segments.is_empty() || segments.join("/") != key {
            return Err(rejected());
        }
        Ok(self.container_dir(container).join(relative))
    }

    async fn container_exists(&self, container: &Container) -> Result<bool> {
        let dir = self.container_dir(container);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(QuillError::storage_msg(format!(
                "Container path {} is not a directory",
                dir.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(QuillError::storage(
                format!("Failed to stat {}", dir.display()),
                e,
            )),
        }
    }

    async fn read_object(path: &Path) -> Result<Option<(Bytes, ETag)>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(QuillError::storage(
                    format!("Failed to read {}", path.display()),
                    e,
                ))
            }
        };
        decode_object(path, raw).map(Some)
    }

    async fn current_etag(path: &Path) -> Result<Option<ETag>> {
        Ok(Self::read_object(path).await?.map(|(_, etag)| etag))
    }
}

/// Split a stored file into its content and ETag header.
fn decode_object(path: &Path, mut raw: Vec<u8>) -> Result<(Bytes, ETag)> {
    let newline = raw.iter().position(|&b| b == b'\n').ok_or_else(|| {
        QuillError::storage_msg(format!("{} has no ETag header", path.display()))
    })?;
    let content = raw.split_off(newline + 1);
    raw.truncate(newline);
    let etag = String::from_utf8(raw).map_err(|e| {
        QuillError::storage(format!("{} has a corrupt ETag header", path.display()), e)
    })?;
    Ok((Bytes::from(content), ETag::from_backend(etag)))
}

fn encode_object(etag: &ETag, data: &[u8]) -> Vec<u8> {
    let header = etag.to_string();
    let mut encoded = Vec::with_capacity(header.len() + 1 + data.len());
    encoded.extend_from_slice(header.as_bytes());
    encoded.push(b'\n');
    encoded.extend_from_slice(data);
    encoded
}

#[async_trait]
impl BlobBackend for LocalBackend {
    #[instrument(skip(self), fields(container = %container, key = %key))]
    async fn get(&self, container: &Container, key: &str) -> Result<Option<(Bytes, ETag)>> {
        let path = self.object_path(container, key)?;
        let found = Self::read_object(&path).await?;
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
        let path = self.object_path(container, key)?;
        let _guard = self.write_lock.lock().await;

        if !self.container_exists(container).await? {
            debug!("put: container missing");
            return Ok(Outcome::NotFound);
        }
        let current = Self::current_etag(&path).await?;
        if !condition.is_satisfied_by(current.as_ref()) {
            debug!(condition = ?condition, "put: precondition failed");
            return Ok(Outcome::PreconditionFailed);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                QuillError::storage(
                    format!("Failed to create parent directories for {}", path.display()),
                    e,
                )
            })?;
        }

        let etag = ETag::generate();
        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4().simple()
        ));
        fs::write(&tmp, encode_object(&etag, &data))
            .await
            .map_err(|e| QuillError::storage(format!("Failed to write {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(QuillError::storage(
                format!("Failed to move {} into place", path.display()),
                e,
            ));
        }

        debug!(etag = %etag, "Put {} bytes to {}", data.len(), key);
        Ok(Outcome::Done(etag))
    }

    #[instrument(skip(self), fields(container = %container, key = %key))]
    async fn delete(
        &self,
        container: &Container,
        key: &str,
        condition: &Condition,
    ) -> Result<Outcome<()>> {
        let path = self.object_path(container, key)?;
        let _guard = self.write_lock.lock().await;

        let Some(current) = Self::current_etag(&path).await? else {
            debug!("Delete {}: already absent", key);
            return Ok(Outcome::NotFound);
        };
        if !condition.is_satisfied_by(Some(&current)) {
            debug!(condition = ?condition, "delete: precondition failed");
            return Ok(Outcome::PreconditionFailed);
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", key);
                Ok(Outcome::Done(()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Outcome::NotFound),
            Err(e) => Err(QuillError::storage(
                format!("Failed to delete {}", path.display()),
                e,
            )),
        }
    }

    #[instrument(skip(self), fields(container = %container))]
    async fn ensure_container(&self, container: &Container) -> Result<()> {
        let dir = self.container_dir(container);
        fs::create_dir_all(&dir).await.map_err(|e| {
            QuillError::storage(format!("Failed to create container {}", dir.display()), e)
        })?;
        Ok(())
    }
}
