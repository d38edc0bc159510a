//! Connection state and lifecycle notifications.
//!
//! The connection state is owned exclusively by the manager control loop;
//! sockets observe transitions through [`LifecycleEvent`] notifications,
//! fired once per socket per transition, in socket-creation order.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// ConnectionState
// ============================================================================

/// State of the managed physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; no connect in progress.
    Disconnected,
    /// Initial connect in progress.
    Connecting,
    /// Handshake complete; events flow.
    Connected,
    /// Unexpected loss; retry loop running.
    Reconnecting,
    /// Closed by the caller or by retry exhaustion; terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if events can be written to the wire.
    #[inline]
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if this is the terminal state.
    #[inline]
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LifecycleEvent
// ============================================================================

/// Notification delivered to socket lifecycle handlers on each state
/// transition.
///
/// Callers observe these instead of raw transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Handshake completed; buffered emits have been flushed.
    Connected,
    /// Transport lost unexpectedly.
    Disconnected,
    /// A reconnection attempt is scheduled.
    ReconnectAttempt {
        /// 1-based attempt number since the loss.
        attempt: u32,
        /// Back-off delay before the attempt.
        delay: Duration,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Failure description.
        message: String,
    },
    /// Retry budget consumed; the manager is now closed.
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
    /// Manager closed; pending emits were discarded.
    Closed,
}

// ============================================================================
// Tests
// ============================================================================
