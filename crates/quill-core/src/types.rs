//! Typed identifiers and values for Quill.
//!
//! Identifiers are validated newtype wrappers around `String`, so a
//! [`Container`] cannot be accidentally used where a [`TextId`] is expected.
//! [`ETag`] is deliberately opaque: callers can compare, display, and
//! persist it, but never look inside it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::QuillError;
use crate::Result;

macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident, $validate:path) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new name, validating its format.
            pub fn new(name: impl Into<String>) -> Result<Self> {
                let name = name.into();
                $validate(&name)?;
                Ok(Self(name))
            }

            /// Return the inner string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = QuillError;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = QuillError;

            fn try_from(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> String {
                name.0
            }
        }
    };
}

define_name!(
    /// Identifier of a logical text resource. Maps 1:1 to an object key.
    TextId,
    validate_text_id
);

define_name!(
    /// A namespace that must exist before objects can be written into it.
    Container,
    validate_container
);

fn validate_text_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(QuillError::config("Text identifier must not be empty"));
    }
    Ok(())
}

/// Container names follow blob-service naming rules: 3 to 63 characters of
/// lowercase letters, digits and `-`, alphanumeric at both ends, and no `--`.
fn validate_container(name: &str) -> Result<()> {
    let invalid =
        |reason: &str| QuillError::config(format!("Invalid container name '{name}': {reason}"));

    if !(3..=63).contains(&name.len()) {
        return Err(invalid("must be 3 to 63 characters long"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid("only lowercase letters, digits and '-' are allowed"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with a letter or digit"));
    }
    if name.contains("--") {
        return Err(invalid("consecutive '-' characters are not allowed"));
    }
    Ok(())
}

/// Opaque version token for a stored object.
///
/// Produced and interpreted only by a [`BlobBackend`](crate::BlobBackend).
/// Pass it back unmodified to assert "I last saw this version".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Wrap a backend-issued token. For [`BlobBackend`](crate::BlobBackend)
    /// implementations only.
    ///
    /// Backends call this with whatever their service returns (an HTTP ETag,
    /// a generation number).
    pub fn from_backend(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Rebuild a token from its [`Display`](fmt::Display) form, e.g. one a
    /// user copied from `quill read` output.
    ///
    /// The result is only meaningful when handed back to the store that
    /// issued it; an arbitrary string simply never matches.
    pub fn from_displayed(displayed: &str) -> Self {
        Self(displayed.to_string())
    }

    /// Issue a fresh token for backends that have no native versioning.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text content together with the version token current when it was read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedText {
    content: String,
    version: ETag,
}

impl VersionedText {
    /// Pair `content` with the version it was read at.
    pub fn new(content: impl Into<String>, version: ETag) -> Self {
        Self {
            content: content.into(),
            version,
        }
    }

    /// The text as last read.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The version token to pass to a conditional update or delete.
    pub fn version(&self) -> &ETag {
        &self.version
    }

    /// Split into content and version without cloning.
    pub fn into_parts(self) -> (String, ETag) {
        (self.content, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_id_creation() {
        let id = TextId::new("functions/abc").unwrap();
        assert_eq!(id.as_str(), "functions/abc");
        assert_eq!(id.to_string(), "functions/abc");
    }

    #[test]
    fn test_text_id_rejects_empty() {
        assert!(matches!(TextId::new(""), Err(QuillError::Config { .. })));
    }

    #[test]
    fn test_container_accepts_valid_names() {
        let longest = "x".repeat(63);
        for name in ["abc", "dashboard-texts", "a1-b2-c3", longest.as_str()] {
            assert!(Container::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_container_rejects_invalid_names() {
        let too_long = "x".repeat(64);
        for name in [
            "ab",
            "Upper",
            "-lead",
            "trail-",
            "dou--ble",
            "under_score",
            too_long.as_str(),
        ] {
            assert!(Container::new(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_name_deserialize_validates() {
        let ok: Container = serde_json::from_str("\"texts\"").unwrap();
        assert_eq!(ok.as_str(), "texts");
        assert!(serde_json::from_str::<Container>("\"NO\"").is_err());
    }

    #[test]
    fn test_etag_generate_unique() {
        assert_ne!(ETag::generate(), ETag::generate());
    }

    #[test]
    fn test_etag_round_trips_through_display() {
        let tag = ETag::from_backend("\"0x8D4BCC2E4835CD0\"");
        assert_eq!(ETag::from_displayed(&tag.to_string()), tag);
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(serde_json::from_str::<ETag>(&json).unwrap(), tag);
    }

    #[test]
    fn test_displayed_token_matches_only_its_own_version() {
        let issued = ETag::generate();
        let typed = ETag::from_displayed(&issued.to_string());
        assert_eq!(typed, issued);
        assert_ne!(ETag::from_displayed("not-a-version"), issued);
    }

    #[test]
    fn test_versioned_text_parts() {
        let tag = ETag::generate();
        let text = VersionedText::new("hello", tag.clone());
        assert_eq!(text.content(), "hello");
        assert_eq!(text.version(), &tag);
        assert_eq!(text.into_parts(), ("hello".to_string(), tag));
    }
}
