//! Namespace-scoped logical socket.
//!
//! A [`Socket`] is a logical channel multiplexed over its manager's
//! physical connection. It carries auth and query metadata for the
//! handshake, emits named events, and dispatches inbound events to
//! registered handlers.
//!
//! # Thread Safety
//!
//! `Socket` is `Send + Sync` and cheap to clone; handler registries and
//! handshake metadata are shared with the manager control loop.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::manager::command::Command;
use crate::manager::state::LifecycleEvent;
use crate::namespace::Namespace;
use crate::protocol::{AuthPayload, QueryParams};

use tokio::sync::{mpsc, oneshot};

// ============================================================================
// Constants
// ============================================================================

/// Event names reserved for the protocol; not usable with [`Socket::on`].
pub const RESERVED_EVENTS: &[&str] = &["connect", "connect_error", "disconnect", "disconnecting"];

// ============================================================================
// Types
// ============================================================================

/// Handler invoked for each inbound event with a matching name.
pub type EventCallback = Box<dyn Fn(&Value) + Send + Sync>;

/// Handler invoked for each connection lifecycle transition.
pub type LifecycleCallback = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

// ============================================================================
// SocketShared
// ============================================================================

/// State shared between a [`Socket`] handle and the manager control loop.
///
/// The control loop reads auth/query at each handshake attempt and invokes
/// handlers when routing inbound frames, so caller mutations are observed
/// on the next attempt.
pub(crate) struct SocketShared {
    /// The socket's namespace.
    pub(crate) namespace: Namespace,
    /// Current auth payload; resent on every handshake attempt.
    pub(crate) auth: Mutex<AuthPayload>,
    /// Current query params; resent on every handshake attempt.
    pub(crate) query: Mutex<QueryParams>,
    /// Event handlers by event name, in registration order.
    pub(crate) handlers: Mutex<FxHashMap<String, Vec<EventCallback>>>,
    /// Lifecycle handlers, in registration order.
    pub(crate) lifecycle: Mutex<Vec<LifecycleCallback>>,
}

impl SocketShared {
    /// Creates shared state for a namespace with initial handshake metadata.
    pub(crate) fn new(namespace: Namespace, auth: AuthPayload, query: QueryParams) -> Self {
        Self {
            namespace,
            auth: Mutex::new(auth),
            query: Mutex::new(query),
            handlers: Mutex::new(FxHashMap::default()),
            lifecycle: Mutex::new(Vec::new()),
        }
    }

    /// Invokes all handlers registered for an event name, in registration
    /// order.
    pub(crate) fn dispatch_event(&self, event: &str, payload: &Value) {
        let handlers = self.handlers.lock();
        if let Some(callbacks) = handlers.get(event) {
            for callback in callbacks {
                callback(payload);
            }
        }
    }

    /// Invokes all lifecycle handlers, in registration order.
    pub(crate) fn dispatch_lifecycle(&self, event: &LifecycleEvent) {
        let callbacks = self.lifecycle.lock();
        for callback in callbacks.iter() {
            callback(event);
        }
    }
}

// ============================================================================
// Socket
// ============================================================================

/// A logical, namespace-scoped channel over a managed connection.
///
/// Created through `Manager::socket`. Emits issued while the manager is
/// not connected are buffered and flushed in order once connected.
///
/// # Example
///
/// ```ignore
/// let socket = manager.socket("/", SocketOptions::new()).await?;
/// socket.on("message", |payload| println!("got {payload}"))?;
/// socket.emit("message", serde_json::json!({ "lobbyId": "123" }));
/// ```
pub struct Socket {
    /// State shared with the control loop.
    pub(crate) shared: Arc<SocketShared>,
    /// Command channel into the control loop.
    pub(crate) command_tx: mpsc::UnboundedSender<Command>,
}

impl Clone for Socket {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            command_tx: self.command_tx.clone(),
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("namespace", &self.shared.namespace)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Socket - Public API
// ============================================================================

impl Socket {
    /// Returns the socket's namespace.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.shared.namespace
    }

    /// Emits a named event with a JSON payload.
    ///
    /// Non-blocking and infallible at call time: while the manager is not
    /// connected the emit is buffered FIFO and flushed on the transition
    /// to Connected; delivery failure surfaces through lifecycle
    /// notifications, never here. Emits against a closed manager and
    /// emits of reserved event names are dropped with a warning.
    pub fn emit(&self, event: impl Into<String>, payload: Value) {
        let event = event.into();
        if RESERVED_EVENTS.contains(&event.as_str()) {
            warn!(event = %event, "dropping emit of reserved event name");
            return;
        }

        let command = Command::Emit {
            namespace: self.shared.namespace.clone(),
            event,
            payload,
        };
        if self.command_tx.send(command).is_err() {
            warn!(namespace = %self.shared.namespace, "emit dropped: manager closed");
        }
    }

    /// Registers a handler for inbound events with the given name.
    ///
    /// All handlers registered for a name are invoked for every matching
    /// event, in registration order, for the lifetime of the socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for reserved event names; use
    /// [`Socket::on_lifecycle`] to observe connection transitions.
    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<()> {
        let event = event.into();
        if RESERVED_EVENTS.contains(&event.as_str()) {
            return Err(Error::invalid_argument(format!(
                "{event:?} is a reserved event name"
            )));
        }

        self.shared
            .handlers
            .lock()
            .entry(event)
            .or_default()
            .push(Box::new(handler));
        Ok(())
    }

    /// Registers a handler for connection lifecycle transitions.
    ///
    /// The manager fires exactly one notification per socket per
    /// transition, in socket-creation order.
    pub fn on_lifecycle(&self, handler: impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
        self.shared.lifecycle.lock().push(Box::new(handler));
    }

    /// Replaces the auth payload used for the next handshake attempt.
    ///
    /// The transport never caches handshake metadata between attempts, so
    /// a payload set between disconnect and reconnect is observed on the
    /// next handshake.
    pub fn set_auth(&self, auth: AuthPayload) {
        *self.shared.auth.lock() = auth;
    }

    /// Returns a snapshot of the current auth payload.
    #[must_use]
    pub fn auth(&self) -> AuthPayload {
        self.shared.auth.lock().clone()
    }

    /// Replaces the query params used for the next handshake attempt.
    pub fn set_query(&self, query: QueryParams) {
        *self.shared.query.lock() = query;
    }

    /// Returns a snapshot of the current query params.
    #[must_use]
    pub fn query(&self) -> QueryParams {
        self.shared.query.lock().clone()
    }

    /// Removes this socket from its manager.
    ///
    /// Buffered emits for this namespace are discarded. If this was the
    /// last socket and the manager's close-on-last-socket policy is
    /// active, the underlying connection is closed.
    pub async fn disconnect(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let command = Command::DisconnectSocket {
            namespace: self.shared.namespace.clone(),
            ack: ack_tx,
        };

        // A closed manager has already detached every socket.
        if self.command_tx.send(command).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
