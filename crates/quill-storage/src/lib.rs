//! Storage backend implementations for Quill.
//!
//! This crate provides concrete implementations of the
//! [`BlobBackend`](quill_core::BlobBackend) trait:
//!
//! - [`MemoryBackend`]: in-process maps, for tests and ephemeral stores
//! - [`LocalBackend`]: filesystem-backed storage for development
//! - [`S3Backend`]: S3-compatible object storage
//!
//! [`open_backend`] picks one from a storage URI and [`open_store`] wires it
//! into a ready [`BlobTextStore`].

pub mod local;
pub mod memory;
pub mod s3;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use quill_core::config::StoreConfig;
use quill_core::error::QuillError;
use quill_core::storage::BlobBackend;
use quill_core::store::BlobTextStore;
use quill_core::Result;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use s3::S3Backend;

/// Open the backend named by `uri`.
///
/// - `memory://`: a fresh [`MemoryBackend`]
/// - `s3://bucket/prefix?region=..`: an [`S3Backend`]
/// - `local://<path>` or a bare path: a [`LocalBackend`]; `~/` expands to
///   the home directory
pub async fn open_backend(uri: &str) -> Result<Arc<dyn BlobBackend>> {
    if uri == "memory://" {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    if uri.starts_with("s3://") {
        return Ok(Arc::new(S3Backend::new(uri).await?));
    }

    let path = uri.strip_prefix("local://").unwrap_or(uri);
    if path.is_empty() || path.contains("://") {
        return Err(QuillError::config(format!("Unsupported storage URI: {uri}")));
    }
    Ok(Arc::new(LocalBackend::new(expand_home(path)?).await?))
}

/// Open the backend from `config` and bind a store to its container.
pub async fn open_store(config: &StoreConfig) -> Result<BlobTextStore> {
    config.validate()?;
    let backend = open_backend(&config.storage_uri).await?;
    info!(
        storage_uri = %config.storage_uri,
        container = %config.container,
        "Versioned text store opened"
    );
    Ok(BlobTextStore::new(backend, config.container.clone()))
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => {
            let home =
                home_dir().ok_or_else(|| QuillError::config("Cannot determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Container, TextId, VersionedTextStore};
    use tempfile::TempDir;

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home("/var/lib/quill").unwrap(),
            PathBuf::from("/var/lib/quill")
        );
    }

    #[test]
    fn test_expand_home_joins_home() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_home("~/.quill").unwrap(), home.join(".quill"));
        }
    }

    #[tokio::test]
    async fn test_open_backend_rejects_unknown_scheme() {
        assert!(open_backend("ftp://host/x").await.is_err());
        assert!(open_backend("local://").await.is_err());
    }

    #[tokio::test]
    async fn test_open_store_local() {
        let tmp = TempDir::new().unwrap();
        let uri = format!("local://{}", tmp.path().display());
        let config = StoreConfig::new(uri, "texts").unwrap();
        let store = open_store(&config).await.unwrap();

        let id = TextId::new("a").unwrap();
        store.create_or_update(&id, "hello").await.unwrap();
        assert!(tmp.path().join("texts").join("a").exists());
        assert_eq!(store.container(), &Container::new("texts").unwrap());
    }

    #[tokio::test]
    async fn test_open_store_memory() {
        let config = StoreConfig::new("memory://", "texts").unwrap();
        let store = open_store(&config).await.unwrap();
        let id = TextId::new("a").unwrap();
        assert!(store.read(&id).await.unwrap().is_none());
    }
}
