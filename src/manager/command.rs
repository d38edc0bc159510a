//! Internal commands for the manager control loop.
//!
//! All mutations of connection state flow through this enum: sockets and
//! manager handles queue commands, the control loop is the single writer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::namespace::Namespace;
use crate::socket::SocketShared;

use super::state::ConnectionState;

// ============================================================================
// Command
// ============================================================================

/// A command queued into the manager control loop.
pub(crate) enum Command {
    /// Establish the connection; ack resolves when Connected or failed.
    Connect {
        /// Resolution channel for the suspended caller.
        ack: oneshot::Sender<Result<()>>,
    },

    /// Register a socket, or resolve the existing one for the namespace.
    OpenSocket {
        /// Candidate shared state for the new socket.
        shared: Arc<SocketShared>,
        /// Per-socket back-off cap override.
        delay_max: Option<Duration>,
        /// Receives the shared state actually registered.
        ack: oneshot::Sender<Arc<SocketShared>>,
    },

    /// Emit a named event; buffered while not connected.
    Emit {
        /// Source socket namespace.
        namespace: Namespace,
        /// Event name.
        event: String,
        /// Event payload.
        payload: Value,
    },

    /// Remove a socket from the manager.
    DisconnectSocket {
        /// Namespace to detach.
        namespace: Namespace,
        /// Resolves once the socket is removed.
        ack: oneshot::Sender<()>,
    },

    /// Close the manager and cancel any pending reconnection timer.
    Close {
        /// Resolves once the loop has processed the close.
        ack: oneshot::Sender<()>,
    },

    /// Snapshot the current connection state.
    State {
        /// Receives the snapshot.
        ack: oneshot::Sender<ConnectionState>,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { .. } => f.debug_struct("Connect").finish_non_exhaustive(),
            Self::OpenSocket { shared, .. } => f
                .debug_struct("OpenSocket")
                .field("namespace", &shared.namespace)
                .finish_non_exhaustive(),
            Self::Emit {
                namespace, event, ..
            } => f
                .debug_struct("Emit")
                .field("namespace", namespace)
                .field("event", event)
                .finish_non_exhaustive(),
            Self::DisconnectSocket { namespace, .. } => f
                .debug_struct("DisconnectSocket")
                .field("namespace", namespace)
                .finish_non_exhaustive(),
            Self::Close { .. } => f.debug_struct("Close").finish_non_exhaustive(),
            Self::State { .. } => f.debug_struct("State").finish_non_exhaustive(),
        }
    }
}
