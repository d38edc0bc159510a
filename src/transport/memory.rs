//! In-process channel-backed transport.
//!
//! Pairs a [`MemoryTransport`] (client side, registered with the manager)
//! with a [`MemoryServer`] (remote side, driven by tests). Frames cross an
//! unbounded channel pair per opened connection, so the remote end can
//! assert on exactly what the manager put on the wire and inject frames
//! back, without any network I/O.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Packet;

use super::{Endpoint, Transport, TransportHandle, TransportKind};

// ============================================================================
// Shared State
// ============================================================================

/// State shared between the client-side factory and the server side.
struct Shared {
    /// Queue of connections awaiting `accept`.
    accept_tx: mpsc::UnboundedSender<MemoryConnection>,
    /// When set, `open` fails with `TransportUnavailable`.
    unavailable: AtomicBool,
    /// When set, `open` fails with a connection error.
    refuse: AtomicBool,
    /// Total `open` calls, including refused ones.
    open_attempts: AtomicUsize,
    /// Client-side `close` calls on opened handles.
    close_count: AtomicUsize,
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Client-side factory for in-process connections.
///
/// Created in a pair with its [`MemoryServer`]:
///
/// ```
/// use realtime_socket::transport::{MemoryTransport, TransportKind};
///
/// let (transport, server) = MemoryTransport::new();
/// assert_eq!(server.open_attempts(), 0);
/// ```
pub struct MemoryTransport {
    /// Shared state with the server side.
    shared: Arc<Shared>,
    /// Kind this instance reports.
    kind: TransportKind,
}

impl MemoryTransport {
    /// Creates a transport/server pair reporting [`TransportKind::Memory`].
    #[must_use]
    pub fn new() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            accept_tx,
            unavailable: AtomicBool::new(false),
            refuse: AtomicBool::new(false),
            open_attempts: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        });

        let transport = Self {
            shared: Arc::clone(&shared),
            kind: TransportKind::Memory,
        };
        let server = MemoryServer { shared, accept_rx };

        (transport, server)
    }

    /// Makes this instance report a different kind.
    ///
    /// Lets tests stand in for a wire transport in the preference order.
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn TransportHandle>> {
        self.shared.open_attempts.fetch_add(1, Ordering::SeqCst);

        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(Error::transport_unavailable(self.kind));
        }
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection(format!(
                "{} refused connection",
                endpoint.as_str()
            )));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        let connection = MemoryConnection {
            tx: Mutex::new(Some(server_tx)),
            rx: server_rx,
        };

        self.shared
            .accept_tx
            .send(connection)
            .map_err(|_| Error::connection("memory server dropped"))?;

        debug!(endpoint = endpoint.as_str(), "memory transport opened");

        Ok(Box::new(MemoryHandle {
            tx: Some(client_tx),
            rx: client_rx,
            shared: Arc::clone(&self.shared),
        }))
    }
}

// ============================================================================
// MemoryHandle
// ============================================================================

/// Client side of one opened connection.
struct MemoryHandle {
    /// Outbound frames; dropped on close so the server observes EOF.
    tx: Option<mpsc::UnboundedSender<Packet>>,
    /// Inbound frames.
    rx: mpsc::UnboundedReceiver<Packet>,
    /// Shared counters.
    shared: Arc<Shared>,
}

#[async_trait]
impl TransportHandle for MemoryHandle {
    async fn send(&mut self, packet: Packet) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(packet).map_err(|_| Error::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        if self.tx.take().is_some() {
            self.shared.close_count.fetch_add(1, Ordering::SeqCst);
            self.rx.close();
        }
    }
}

// ============================================================================
// MemoryServer
// ============================================================================

/// Remote end of the in-process transport.
///
/// Tests accept connections opened by the manager, inspect outbound frames
/// and inject inbound ones.
pub struct MemoryServer {
    /// Shared state with the client side.
    shared: Arc<Shared>,
    /// Connections opened by the client side.
    accept_rx: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl MemoryServer {
    /// Accepts the next connection opened by the client side.
    ///
    /// Returns `None` when the transport factory has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryConnection> {
        self.accept_rx.recv().await
    }

    /// Makes subsequent `open` calls fail with `TransportUnavailable`.
    #[inline]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes subsequent `open` calls fail with a connection error.
    #[inline]
    pub fn set_refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Returns the total number of `open` calls, including failed ones.
    #[inline]
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.shared.open_attempts.load(Ordering::SeqCst)
    }

    /// Returns the number of client-side closes of opened handles.
    #[inline]
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.shared.close_count.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MemoryConnection
// ============================================================================

/// Server side of one opened connection.
pub struct MemoryConnection {
    /// Frames toward the client; dropped on close so the client observes EOF.
    tx: Mutex<Option<mpsc::UnboundedSender<Packet>>>,
    /// Frames from the client.
    rx: mpsc::UnboundedReceiver<Packet>,
}

impl MemoryConnection {
    /// Receives the next frame sent by the client.
    ///
    /// Returns `None` once the client has closed its side.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Sends a frame to the client.
    ///
    /// Returns `false` if the client side is gone.
    pub fn send(&self, packet: Packet) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(packet).is_ok(),
            None => false,
        }
    }

    /// Drops the server side, simulating an unexpected transport loss.
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use serde_json::json;

    fn endpoint() -> Endpoint {
        Endpoint::new("http://example.test:8080").expect("valid url")
    }

    #[tokio::test]
    async fn test_open_and_exchange_frames() {
        let (transport, mut server) = MemoryTransport::new();
        let mut handle = transport.open(&endpoint()).await.expect("open");
        let mut conn = server.accept().await.expect("accept");

        let outbound = Packet::event(Namespace::root(), "message", json!({ "lobbyId": "123" }));
        handle.send(outbound.clone()).await.expect("send");
        assert_eq!(conn.recv().await, Some(outbound));

        let inbound = Packet::event(Namespace::root(), "joined", json!({ "ok": true }));
        assert!(conn.send(inbound.clone()));
        assert_eq!(handle.recv().await, Some(inbound));
    }

    #[tokio::test]
    async fn test_unavailable_open_fails() {
        let (transport, server) = MemoryTransport::new();
        server.set_unavailable(true);

        let result = transport.open(&endpoint()).await;
        assert!(matches!(
            result,
            Err(Error::TransportUnavailable {
                kind: TransportKind::Memory
            })
        ));
        assert_eq!(server.open_attempts(), 1);
    }

    #[tokio::test]
    async fn test_refused_open_fails_with_connection_error() {
        let (transport, server) = MemoryTransport::new();
        server.set_refuse(true);

        let result = transport.open(&endpoint()).await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    #[tokio::test]
    async fn test_server_close_ends_client_stream() {
        let (transport, mut server) = MemoryTransport::new();
        let mut handle = transport.open(&endpoint()).await.expect("open");
        let conn = server.accept().await.expect("accept");

        conn.close();
        assert_eq!(handle.recv().await, None);
    }

    #[tokio::test]
    async fn test_client_close_counted_once() {
        let (transport, mut server) = MemoryTransport::new();
        let mut handle = transport.open(&endpoint()).await.expect("open");
        let mut conn = server.accept().await.expect("accept");

        handle.close().await;
        handle.close().await;

        assert_eq!(server.close_count(), 1);
        assert_eq!(conn.recv().await, None);
        assert!(handle.send(Packet::Disconnect { namespace: Namespace::root() }).await.is_err());
    }

    #[tokio::test]
    async fn test_with_kind_override() {
        let (transport, _server) = MemoryTransport::new();
        let transport = transport.with_kind(TransportKind::WebTransport);
        assert_eq!(transport.kind(), TransportKind::WebTransport);
    }
}
