//! Pluggable transport layer.
//!
//! Transports carry protocol frames between the local end and the remote
//! end. The actual framing mechanisms (WebSocket, WebTransport) are
//! external collaborators: the manager only ever talks to the narrow
//! [`Transport`] / [`TransportHandle`] interface, and concrete
//! implementations are registered at construction time.
//!
//! # Connection Lifecycle
//!
//! 1. The manager walks its transport preference order
//! 2. [`TransportRegistry::get`] resolves each kind to an implementation
//! 3. [`Transport::open`] establishes a stream to the endpoint
//! 4. [`TransportHandle`] sends/receives frames until closed
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | Channel-backed in-process transport for tests and demos |

// ============================================================================
// Submodules
// ============================================================================

/// In-process channel-backed transport.
pub mod memory;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryConnection, MemoryServer, MemoryTransport};

// ============================================================================
// TransportKind
// ============================================================================

/// Identifies a transport mechanism in the preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// WebTransport (HTTP/3 datagram/stream) framing.
    WebTransport,
    /// WebSocket framing.
    WebSocket,
    /// In-process channel pair, used in tests.
    Memory,
}

impl TransportKind {
    /// Returns the canonical lowercase name of the kind.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebTransport => "webtransport",
            Self::WebSocket => "websocket",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A parsed server endpoint.
///
/// Immutable after manager creation.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Parsed endpoint URL.
    url: Url,
}

impl Endpoint {
    /// Parses and validates an endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be parsed.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("invalid url {url:?}: {e}")))?;
        Ok(Self { url })
    }

    /// Returns the parsed URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the URL as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Factory for opening streams of a particular transport kind.
///
/// Implementations are registered with a [`TransportRegistry`] and resolved
/// by the manager according to its preference order.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the kind this transport implements.
    fn kind(&self) -> TransportKind;

    /// Opens a stream to the endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::TransportUnavailable`] if this mechanism is not supported
    ///   in the current environment (recovered by preference fall-through)
    /// - [`Error::Connection`] if the endpoint is unreachable
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn TransportHandle>>;
}

// ============================================================================
// TransportHandle
// ============================================================================

/// An open transport stream.
///
/// Owned exclusively by the manager control loop; all frame I/O for one
/// physical connection goes through a single handle.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Sends a frame to the remote end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the stream is no longer open.
    async fn send(&mut self, packet: Packet) -> Result<()>;

    /// Receives the next frame from the remote end.
    ///
    /// Returns `None` when the stream has closed.
    async fn recv(&mut self) -> Option<Packet>;

    /// Closes the stream.
    async fn close(&mut self);
}

// ============================================================================
// TransportRegistry
// ============================================================================

/// Registry of available transport implementations, keyed by kind.
///
/// Registering a second implementation for the same kind replaces the
/// first.
#[derive(Default)]
pub struct TransportRegistry {
    /// Registered implementations.
    transports: FxHashMap<TransportKind, Box<dyn Transport>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transport implementation under its own kind.
    pub fn register(&mut self, transport: Box<dyn Transport>) {
        self.transports.insert(transport.kind(), transport);
    }

    /// Resolves a kind to its registered implementation.
    #[inline]
    #[must_use]
    pub fn get(&self, kind: TransportKind) -> Option<&dyn Transport> {
        self.transports.get(&kind).map(AsRef::as_ref)
    }

    /// Returns `true` if an implementation is registered for the kind.
    #[inline]
    #[must_use]
    pub fn supports(&self, kind: TransportKind) -> bool {
        self.transports.contains_key(&kind)
    }

    /// Returns the number of registered implementations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Returns `true` if no implementations are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("kinds", &self.transports.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::WebTransport.to_string(), "webtransport");
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert_eq!(TransportKind::Memory.to_string(), "memory");
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::new("http://example.test:8080").expect("valid url");
        assert_eq!(endpoint.url().port(), Some(8080));
        assert_eq!(endpoint.as_str(), "http://example.test:8080/");
    }

    #[test]
    fn test_endpoint_invalid_url() {
        let result = Endpoint::new("not a url");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_registry_register_and_resolve() {
        let (transport, _server) = MemoryTransport::new();
        let mut registry = TransportRegistry::new();
        assert!(registry.is_empty());

        registry.register(Box::new(transport));

        assert_eq!(registry.len(), 1);
        assert!(registry.supports(TransportKind::Memory));
        assert!(!registry.supports(TransportKind::WebSocket));
        assert!(registry.get(TransportKind::Memory).is_some());
    }

    #[test]
    fn test_registry_replaces_same_kind() {
        let (first, _s1) = MemoryTransport::new();
        let (second, _s2) = MemoryTransport::new();

        let mut registry = TransportRegistry::new();
        registry.register(Box::new(first));
        registry.register(Box::new(second));

        assert_eq!(registry.len(), 1);
    }
}
