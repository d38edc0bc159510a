//! Packet definitions and serialization.
//!
//! Packets are the unit handed to a transport. Serialization is JSON with
//! an internal `type` tag; payloads stay as raw [`serde_json::Value`] maps
//! so the crate imposes no schema on application events.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::namespace::Namespace;

// ============================================================================
// Types
// ============================================================================

/// Opaque auth payload supplied by the caller.
///
/// Sent once per handshake attempt, never persisted beyond the in-flight
/// handshake.
pub type AuthPayload = Map<String, Value>;

/// Query parameters attached to every handshake attempt.
pub type QueryParams = FxHashMap<String, String>;

// ============================================================================
// Packet
// ============================================================================

/// A protocol frame carried over a transport.
///
/// # Format
///
/// ```json
/// { "type": "connect", "namespace": "/", "auth": { "token": "123" }, "query": { "k": "v" } }
/// { "type": "connectAck", "namespace": "/" }
/// { "type": "connectError", "namespace": "/", "code": "authFailed", "message": "bad token" }
/// { "type": "event", "namespace": "/", "event": "message", "payload": { "lobbyId": "123" } }
/// { "type": "disconnect", "namespace": "/" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Packet {
    /// Handshake request opening a logical channel.
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Target namespace.
        namespace: Namespace,
        /// Auth payload for this attempt.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        auth: AuthPayload,
        /// Query parameters for this attempt.
        #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
        query: QueryParams,
    },

    /// Handshake accepted by the remote end.
    #[serde(rename_all = "camelCase")]
    ConnectAck {
        /// Acknowledged namespace.
        namespace: Namespace,
    },

    /// Handshake rejected by the remote end.
    #[serde(rename_all = "camelCase")]
    ConnectError {
        /// Rejected namespace.
        namespace: Namespace,
        /// Rejection category.
        code: ConnectErrorCode,
        /// Human-readable rejection message.
        #[serde(default)]
        message: String,
    },

    /// Named application event.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Namespace the event is tagged with.
        namespace: Namespace,
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        payload: Value,
    },

    /// Logical channel teardown.
    #[serde(rename_all = "camelCase")]
    Disconnect {
        /// Namespace being torn down.
        namespace: Namespace,
    },
}

impl Packet {
    /// Returns the namespace this packet is tagged with.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        match self {
            Self::Connect { namespace, .. }
            | Self::ConnectAck { namespace }
            | Self::ConnectError { namespace, .. }
            | Self::Event { namespace, .. }
            | Self::Disconnect { namespace } => namespace,
        }
    }

    /// Creates an event packet.
    #[inline]
    #[must_use]
    pub fn event(namespace: Namespace, event: impl Into<String>, payload: Value) -> Self {
        Self::Event {
            namespace,
            event: event.into(),
            payload,
        }
    }
}

// ============================================================================
// ConnectErrorCode
// ============================================================================

/// Handshake rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectErrorCode {
    /// Auth payload was refused.
    AuthFailed,
    /// Handshake refused for another reason.
    Rejected,
}

// ============================================================================
// Tests
// ============================================================================
