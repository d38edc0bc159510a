//! Error types for the real-time socket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use realtime_socket::{Manager, Result};
//!
//! async fn example(manager: &Manager) -> Result<()> {
//!     manager.connect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Namespace | [`Error::InvalidNamespace`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Handshake | [`Error::AuthRejected`] |
//! | Transport | [`Error::TransportUnavailable`] |
//! | Reconnection | [`Error::ReconnectExhausted`] |
//! | External | [`Error::Json`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::transport::TransportKind;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when manager configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument.
    ///
    /// Returned when an operation receives a value it cannot accept,
    /// such as registering a handler for a reserved event name.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Namespace string is malformed.
    ///
    /// Namespaces must be non-empty and begin with `/`.
    #[error("Invalid namespace: {namespace:?}")]
    InvalidNamespace {
        /// The offending namespace string.
        namespace: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection failed.
    ///
    /// Returned when no transport is reachable or the handshake is rejected
    /// for a reason other than authentication.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    ///
    /// Returned when the remote end does not complete the handshake
    /// within the timeout period.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed.
    ///
    /// Returned when an operation is attempted against a manager that has
    /// been closed, or when the control loop has terminated.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Server rejected the handshake auth payload.
    ///
    /// Never retried automatically: retrying with the same payload would
    /// fail identically. Supply new auth before the next explicit connect.
    #[error("Auth rejected for namespace {namespace}: {message}")]
    AuthRejected {
        /// Namespace whose handshake was rejected.
        namespace: String,
        /// Rejection message from the server.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// A transport kind is not supported in this environment.
    ///
    /// Recovered locally by falling through to the next preference unless
    /// strict transport mode is enabled.
    #[error("Transport unavailable: {kind}")]
    TransportUnavailable {
        /// The unsupported transport kind.
        kind: TransportKind,
    },

    // ========================================================================
    // Reconnection Errors
    // ========================================================================
    /// Reconnection retry budget consumed.
    ///
    /// Surfaced via a manager-level lifecycle notification after the
    /// configured number of attempts all fail.
    #[error("Reconnection exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid namespace error.
    #[inline]
    pub fn invalid_namespace(namespace: impl Into<String>) -> Self {
        Self::InvalidNamespace {
            namespace: namespace.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an auth rejected error.
    #[inline]
    pub fn auth_rejected(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthRejected {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    /// Creates a transport unavailable error.
    #[inline]
    pub fn transport_unavailable(kind: TransportKind) -> Self {
        Self::TransportUnavailable { kind }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionTimeout { .. } | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this is an auth rejection.
    #[inline]
    #[must_use]
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    /// Returns `true` if this error is recoverable by the reconnection loop.
    ///
    /// Auth rejections are not recoverable: retrying with the same payload
    /// would fail identically.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::TransportUnavailable { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
