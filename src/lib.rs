//! Real-time socket - Minimal client connection manager.
//!
//! This library manages one physical connection to a real-time server and
//! multiplexes any number of namespace-scoped sockets over it.
//!
//! # Architecture
//!
//! The crate follows a handle-and-control-loop model:
//!
//! - **Handles ([`Manager`], [`Socket`])**: Cheap clones that queue commands
//! - **Control loop**: One spawned task owning the transport, state, and
//!   emit buffer
//! - **Transports**: Pluggable framing mechanisms resolved by preference
//!   order
//!
//! Key design principles:
//!
//! - One physical connection per manager, shared by all of its sockets
//! - Every state transition runs on the control loop (single writer)
//! - Emits issued while disconnected are buffered FIFO and flushed on
//!   connect
//! - Unexpected losses recover with exponential back-off, capped and
//!   cancellable
//!
//! # Quick Start
//!
//! ```no_run
//! use realtime_socket::{Manager, Result, SocketOptions, TransportKind};
//! # use realtime_socket::transport::MemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     # let (transport, _server) = MemoryTransport::new();
//!     // Build a manager with a transport preference order
//!     let manager = Manager::builder()
//!         .url("http://nogler.ddns.net:8080")
//!         .transports([TransportKind::WebTransport])
//!         .register(Box::new(transport))
//!         .build()?;
//!
//!     // Open a namespace socket carrying auth and query metadata
//!     let socket = manager
//!         .socket(
//!             "/",
//!             SocketOptions::new()
//!                 .with_auth_entry("token", "123")
//!                 .with_query_entry("my-key", "my-value"),
//!         )
//!         .await?;
//!
//!     // Emit before or after connecting; order is preserved
//!     socket.emit("message", serde_json::json!({ "lobbyId": "123" }));
//!     manager.connect().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`manager`] | Connection manager, options, and lifecycle state |
//! | [`namespace`] | Type-safe namespace wrapper |
//! | [`protocol`] | Wire frame types (internal format) |
//! | [`socket`] | Namespace-scoped socket handles |
//! | [`transport`] | Pluggable transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Connection manager.
///
/// Use [`Manager::builder()`] to create a configured manager instance.
pub mod manager;

/// Type-safe namespace wrapper.
///
/// Validated at construction so malformed namespaces never reach the wire.
pub mod namespace;

/// Wire frame types.
///
/// Internal module defining the handshake and event frame structures.
pub mod protocol;

/// Namespace-scoped socket handles.
///
/// Sockets are created through [`Manager::socket`].
pub mod socket;

/// Pluggable transport layer.
///
/// Defines the [`Transport`] seam and the in-process memory transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Manager types
pub use manager::{
    ConnectionState, LifecycleEvent, Manager, ManagerBuilder, ManagerOptions, ReconnectionPolicy,
    SocketOptions,
};

// Namespace types
pub use namespace::Namespace;

// Protocol types
pub use protocol::{AuthPayload, ConnectErrorCode, Packet, QueryParams};

// Socket types
pub use socket::Socket;

// Transport types
pub use transport::{Endpoint, Transport, TransportHandle, TransportKind, TransportRegistry};
