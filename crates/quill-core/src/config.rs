//! Store configuration.
//!
//! [`StoreConfig`] names the storage backend (by URI) and the container the
//! versioned texts live in. It can be built explicitly or read from the
//! environment with [`StoreConfig::from_env`].

use serde::{Deserialize, Serialize};

use crate::error::QuillError;
use crate::types::Container;
use crate::Result;

/// Environment variable holding the storage URI.
pub const STORAGE_URI_ENV: &str = "QUILL_STORAGE_URI";

/// Environment variable holding the container name.
pub const CONTAINER_ENV: &str = "QUILL_CONTAINER";

/// Default storage URI when none is configured.
pub const DEFAULT_STORAGE_URI: &str = "local://~/.quill/data";

/// Default container name when none is configured.
pub const DEFAULT_CONTAINER: &str = "texts";

const SUPPORTED_SCHEMES: [&str; 3] = ["memory://", "local://", "s3://"];

/// Configuration for a versioned text store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage URI: `"memory://"`, `"local://~/.quill/data"` or
    /// `"s3://bucket/prefix?region=eu-west-1"`. A bare path is treated as
    /// a local directory.
    pub storage_uri: String,

    /// Container (namespace) holding the texts. Created lazily on first write.
    pub container: Container,
}

impl StoreConfig {
    /// Create a config, validating the container name.
    ///
    /// # Example
    ///
    /// ```
    /// use quill_core::config::StoreConfig;
    ///
    /// let config = StoreConfig::new("memory://", "texts").unwrap();
    /// assert_eq!(config.container.as_str(), "texts");
    /// ```
    pub fn new(storage_uri: impl Into<String>, container: impl Into<String>) -> Result<Self> {
        let config = Self {
            storage_uri: storage_uri.into(),
            container: Container::new(container)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read the config from `QUILL_STORAGE_URI` and `QUILL_CONTAINER`,
    /// falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(STORAGE_URI_ENV).ok(),
            std::env::var(CONTAINER_ENV).ok(),
        )
    }

    fn from_vars(storage_uri: Option<String>, container: Option<String>) -> Result<Self> {
        Self::new(
            storage_uri.unwrap_or_else(|| DEFAULT_STORAGE_URI.to_string()),
            container.unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
        )
    }

    /// Check that the storage URI is non-empty and uses a known scheme.
    pub fn validate(&self) -> Result<()> {
        let uri = self.storage_uri.trim();
        if uri.is_empty() {
            return Err(QuillError::config("Storage URI must not be empty"));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            let scheme = format!("{scheme}://");
            if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
                return Err(QuillError::config(format!(
                    "Unsupported storage scheme '{scheme}' in {uri}"
                )));
            }
        }
        Ok(())
    }
}
