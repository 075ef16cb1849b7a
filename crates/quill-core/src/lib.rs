//! Quill core types, traits, configuration, and errors.
//!
//! This crate provides the building blocks for versioned text storage:
//! validated identifiers and the opaque [`ETag`], the [`BlobBackend`]
//! conditional-write trait, the [`VersionedTextStore`] trait with its
//! blob-backed implementation [`BlobTextStore`], store configuration, and
//! the unified error type.

pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

pub use config::StoreConfig;
pub use error::QuillError;
pub use storage::{BlobBackend, Condition, Outcome};
pub use store::{BlobTextStore, VersionedTextStore};
pub use types::*;

/// Convenience Result type using [`QuillError`].
pub type Result<T> = std::result::Result<T, QuillError>;
