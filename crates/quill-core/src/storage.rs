//! The BlobBackend trait: the conditional-write primitive Quill builds on.
//!
//! Implementations include `MemoryBackend`, `LocalBackend` (filesystem) and
//! `S3Backend` (any S3-compatible endpoint), all in the `quill-storage` crate.
//! The versioned text store never touches storage except through this trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{Container, ETag};
use crate::Result;

/// Precondition attached to a write or delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Apply unconditionally.
    None,
    /// Apply only if no object currently exists at the key.
    IfNotExists,
    /// Apply only if the object's current ETag equals this one.
    IfMatch(ETag),
}

impl Condition {
    /// Whether the condition holds given the object's current ETag
    /// (`None` when absent). Backends without a native conditional write
    /// evaluate this while holding their write lock.
    pub fn is_satisfied_by(&self, current: Option<&ETag>) -> bool {
        match self {
            Condition::None => true,
            Condition::IfNotExists => current.is_none(),
            Condition::IfMatch(expected) => current == Some(expected),
        }
    }
}

/// Result of a backend mutation that did not fault.
///
/// Every variant other than [`Outcome::Done`] is an expected condition the
/// caller is meant to branch on, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation was applied.
    Done(T),
    /// For `put`, the container is missing. For `delete`, the object or its
    /// container is missing.
    NotFound,
    /// The attached [`Condition`] did not hold.
    PreconditionFailed,
    /// Another writer was mutating the object at the same time.
    Conflict,
}

impl<T> Outcome<T> {
    /// Whether the operation was applied.
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

/// A key→bytes store with atomic conditional writes, partitioned into
/// containers.
///
/// Implementations must be `Send + Sync` for use across async tasks.
///
/// # Conditional Writes
///
/// [`put`](BlobBackend::put) and [`delete`](BlobBackend::delete) evaluate
/// their [`Condition`] atomically with the mutation. This is the only
/// serialisation point Quill relies on; callers never check-then-act.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Read an object and its current ETag. `None` if the object or its
    /// container does not exist.
    async fn get(&self, container: &Container, key: &str) -> Result<Option<(Bytes, ETag)>>;

    /// Write an object under `condition`, returning the new ETag.
    ///
    /// `IfMatch` against an absent object reports
    /// [`Outcome::PreconditionFailed`]; [`Outcome::NotFound`] is reserved
    /// for a missing container.
    async fn put(
        &self,
        container: &Container,
        key: &str,
        data: Bytes,
        condition: &Condition,
    ) -> Result<Outcome<ETag>>;

    /// Delete an object under `condition`.
    async fn delete(
        &self,
        container: &Container,
        key: &str,
        condition: &Condition,
    ) -> Result<Outcome<()>>;

    /// Create the container if it does not exist. Idempotent.
    async fn ensure_container(&self, container: &Container) -> Result<()>;
}
