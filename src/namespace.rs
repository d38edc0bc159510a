//! Type-safe namespace wrapper.
//!
//! A namespace is a string-keyed logical channel multiplexed over one
//! physical connection. The wrapper enforces the format at construction
//! so the rest of the crate never handles malformed namespace strings.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Namespace
// ============================================================================

/// A validated namespace string.
///
/// Namespaces must be non-empty and begin with `/`. The root namespace
/// is `/`.
///
/// # Example
///
/// ```
/// use realtime_socket::Namespace;
///
/// let root = Namespace::root();
/// let lobby = Namespace::new("/lobby").unwrap();
///
/// assert_eq!(root.as_str(), "/");
/// assert_eq!(lobby.as_str(), "/lobby");
/// assert!(Namespace::new("lobby").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a validated namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNamespace`] if the string is empty or does
    /// not begin with `/`.
    pub fn new(namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || !namespace.starts_with('/') {
            return Err(Error::invalid_namespace(namespace));
        }
        Ok(Self(namespace))
    }

    /// Returns the root namespace `/`.
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns the namespace as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the root namespace.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Namespace {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_namespace() {
        let ns = Namespace::root();
        assert_eq!(ns.as_str(), "/");
        assert!(ns.is_root());
    }

    #[test]
    fn test_valid_namespace() {
        let ns = Namespace::new("/lobby").expect("valid namespace");
        assert_eq!(ns.as_str(), "/lobby");
        assert!(!ns.is_root());
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let result = Namespace::new("");
        assert!(matches!(result, Err(Error::InvalidNamespace { .. })));
    }

    #[test]
    fn test_missing_slash_rejected() {
        let result = Namespace::new("lobby");
        assert!(matches!(result, Err(Error::InvalidNamespace { .. })));
    }

    #[test]
    fn test_try_from_str() {
        let ns = Namespace::try_from("/game").expect("valid namespace");
        assert_eq!(ns.as_str(), "/game");
        assert!(Namespace::try_from("game").is_err());
    }

    #[test]
    fn test_display() {
        let ns = Namespace::new("/lobby").expect("valid namespace");
        assert_eq!(format!("{ns}"), "/lobby");
    }

    #[test]
    fn test_serde_transparent() {
        let ns = Namespace::new("/lobby").expect("valid namespace");
        let json = serde_json::to_string(&ns).expect("serialize");
        assert_eq!(json, "\"/lobby\"");

        let back: Namespace = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ns);
    }
}
