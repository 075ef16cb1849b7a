//! Unified error types for Quill.
//!
//! Only unexpected faults are errors. Expected conditions such as a missing
//! object, a stale ETag, or a concurrent writer are ordinary return values
//! (see [`Outcome`](crate::storage::Outcome)) and never surface here.

use std::string::FromUtf8Error;

use thiserror::Error;

/// The unified error type for all Quill operations.
#[derive(Error, Debug)]
pub enum QuillError {
    /// A storage operation failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A key was missing where absence is not a recoverable condition.
    #[error("Not found: {key}")]
    NotFound {
        /// The storage key that was not found.
        key: String,
    },

    /// Stored bytes could not be decoded as UTF-8 text.
    #[error("Object {key} does not contain valid UTF-8 text")]
    InvalidText {
        /// The storage key holding the undecodable bytes.
        key: String,
        /// The decoding failure.
        #[source]
        source: FromUtf8Error,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// The backend cannot honor the requested operation.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// An internal error (bug).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl QuillError {
    /// Create a storage error from a message and source error.
    pub fn storage(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error from a message only.
    pub fn storage_msg(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
