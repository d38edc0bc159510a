//! Manager handle and control loop.
//!
//! [`Manager`] is a cheap clonable handle; the actual connection lives in
//! a spawned control-loop task that owns the transport handle, the socket
//! registry, the buffered-emit queue, and the connection state. Handles
//! talk to the loop exclusively through the command channel, so every
//! state transition is serialized by construction.
//!
//! Back-off timers run inside the loop and are raced against the command
//! channel, which is what makes `close` cancel a scheduled reconnection
//! attempt instead of waiting it out.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::namespace::Namespace;
use crate::protocol::{ConnectErrorCode, Packet};
use crate::socket::{Socket, SocketShared};
use crate::transport::{Endpoint, TransportHandle, TransportRegistry};

use super::builder::ManagerBuilder;
use super::command::Command;
use super::options::{ManagerOptions, SocketOptions};
use super::state::{ConnectionState, LifecycleEvent};

// ============================================================================
// Manager
// ============================================================================

/// Handle to a managed connection.
///
/// Owns nothing itself; cloning is cheap and every clone addresses the
/// same control-loop task. The loop task exits when the manager is closed
/// or when every handle (manager and socket) has been dropped.
///
/// # Example
///
/// ```ignore
/// let manager = Manager::builder()
///     .url("http://example.test:8080")
///     .transports([TransportKind::WebTransport])
///     .register(Box::new(transport))
///     .build()?;
///
/// let socket = manager
///     .socket("/", SocketOptions::new().with_auth_entry("token", "123"))
///     .await?;
/// manager.connect().await?;
/// socket.emit("message", serde_json::json!({ "lobbyId": "123" }));
/// ```
#[derive(Clone)]
pub struct Manager {
    /// Command channel into the control loop.
    command_tx: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

// ============================================================================
// Manager - Public API
// ============================================================================

impl Manager {
    /// Creates a builder for configuring a manager.
    #[inline]
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Spawns the control loop and returns the handle addressing it.
    pub(crate) fn spawn(
        endpoint: Endpoint,
        options: ManagerOptions,
        registry: TransportRegistry,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let control = ControlLoop {
            endpoint,
            options,
            registry,
            state: ConnectionState::Disconnected,
            sockets: Vec::new(),
            pending: VecDeque::new(),
            handle: None,
        };
        tokio::spawn(control.run(command_rx));

        Self { command_tx }
    }

    /// Establishes the connection, suspending until the handshake for every
    /// registered socket has completed.
    ///
    /// Idempotent while connected. Fails without scheduling retries: the
    /// reconnection policy only governs recovery from an *unexpected* loss
    /// of an established connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if no preferred transport is reachable, or
    ///   while a reconnection cycle is in progress
    /// - [`Error::ConnectionTimeout`] if the handshake does not complete
    ///   within the configured timeout
    /// - [`Error::AuthRejected`] if the server refuses a socket's auth
    /// - [`Error::ConnectionClosed`] if the manager has been closed
    pub async fn connect(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Connect { ack: ack_tx })
            .map_err(|_| Error::ConnectionClosed)?;
        ack_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Resolves the socket for a namespace, creating it on first use.
    ///
    /// Requesting the same namespace again returns a handle to the same
    /// underlying socket; the second call's auth and query are ignored.
    /// Sockets opened while connected handshake immediately over the live
    /// connection.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidNamespace`] if the namespace string is malformed
    /// - [`Error::ConnectionClosed`] if the manager has been closed
    pub async fn socket(&self, namespace: &str, options: SocketOptions) -> Result<Socket> {
        let namespace = Namespace::new(namespace)?;
        let shared = Arc::new(SocketShared::new(namespace, options.auth, options.query));

        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(Command::OpenSocket {
                shared,
                delay_max: options.reconnection_delay_max,
                ack: ack_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        let shared = ack_rx.await.map_err(|_| Error::ConnectionClosed)?;
        Ok(Socket {
            shared,
            command_tx: self.command_tx.clone(),
        })
    }

    /// Returns a snapshot of the connection state.
    ///
    /// A manager whose control loop has terminated reports
    /// [`ConnectionState::Closed`].
    pub async fn state(&self) -> ConnectionState {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::State { ack: ack_tx })
            .is_err()
        {
            return ConnectionState::Closed;
        }
        ack_rx.await.unwrap_or(ConnectionState::Closed)
    }

    /// Closes the manager, cancelling any scheduled reconnection attempt
    /// and discarding buffered emits.
    ///
    /// Suspends until the control loop has processed the close. Idempotent;
    /// closing an already-closed manager is a no-op.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Close { ack: ack_tx })
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
}

// ============================================================================
// Control Loop
// ============================================================================

/// Loop continuation decision.
enum Flow {
    /// Keep processing.
    Continue,
    /// Terminate the control loop.
    Stop,
}

/// Single-writer owner of all connection state.
struct ControlLoop {
    /// Target endpoint.
    endpoint: Endpoint,
    /// Manager configuration.
    options: ManagerOptions,
    /// Registered transport implementations.
    registry: TransportRegistry,
    /// Current connection state.
    state: ConnectionState,
    /// Registered sockets, in creation order.
    sockets: Vec<Arc<SocketShared>>,
    /// Buffered emits awaiting a connection, globally FIFO.
    pending: VecDeque<(Namespace, String, Value)>,
    /// Open transport handle while connected.
    handle: Option<Box<dyn TransportHandle>>,
}

impl ControlLoop {
    /// Runs until closed or until every command sender is gone.
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let flow = match self.handle.take() {
                Some(handle) => self.run_connected(handle, &mut command_rx).await,
                None => match command_rx.recv().await {
                    Some(command) => self.handle_idle_command(command).await,
                    None => Flow::Stop,
                },
            };
            if matches!(flow, Flow::Stop) {
                break;
            }
        }
        debug!("manager control loop terminated");
    }

    // ========================================================================
    // Idle State
    // ========================================================================

    /// Processes one command while no connection is open.
    async fn handle_idle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Connect { ack } => {
                self.state = ConnectionState::Connecting;
                match self.establish().await {
                    Ok(handle) => {
                        self.handle = Some(handle);
                        self.state = ConnectionState::Connected;
                        let _ = ack.send(Ok(()));
                    }
                    Err(error) => {
                        self.state = ConnectionState::Disconnected;
                        let _ = ack.send(Err(error));
                    }
                }
                Flow::Continue
            }
            Command::OpenSocket {
                shared,
                delay_max,
                ack,
            } => {
                let (shared, _) = self.register_or_existing(shared, delay_max);
                let _ = ack.send(shared);
                Flow::Continue
            }
            Command::Emit {
                namespace,
                event,
                payload,
            } => {
                self.buffer_emit(namespace, event, payload);
                Flow::Continue
            }
            Command::DisconnectSocket { namespace, ack } => {
                self.remove_socket(&namespace);
                let _ = ack.send(());
                Flow::Continue
            }
            Command::Close { ack } => {
                self.finish_close();
                let _ = ack.send(());
                Flow::Stop
            }
            Command::State { ack } => {
                let _ = ack.send(self.state);
                Flow::Continue
            }
        }
    }

    // ========================================================================
    // Connected State
    // ========================================================================

    /// Drives one established connection until it is lost or closed.
    async fn run_connected(
        &mut self,
        mut handle: Box<dyn TransportHandle>,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Flow {
        // Buffered emits go out before the Connected notification so
        // handlers observe a drained queue.
        if let Err(error) = self.flush_pending(&mut handle).await {
            warn!(%error, "connection lost while flushing buffered emits");
            drop(handle);
            return self.handle_connection_loss(command_rx).await;
        }
        self.notify_all(&LifecycleEvent::Connected);

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    None => {
                        handle.close().await;
                        return Flow::Stop;
                    }
                    Some(Command::Connect { ack }) => {
                        let _ = ack.send(Ok(()));
                    }
                    Some(Command::OpenSocket { shared, delay_max, ack }) => {
                        let (shared, is_new) = self.register_or_existing(shared, delay_max);
                        let request = Packet::Connect {
                            namespace: shared.namespace.clone(),
                            auth: shared.auth.lock().clone(),
                            query: shared.query.lock().clone(),
                        };
                        let _ = ack.send(shared);
                        if is_new {
                            if let Err(error) = handle.send(request).await {
                                warn!(%error, "connection lost during socket handshake");
                                drop(handle);
                                return self.handle_connection_loss(command_rx).await;
                            }
                        }
                    }
                    Some(Command::Emit { namespace, event, payload }) => {
                        if self.find_socket(&namespace).is_none() {
                            debug!(%namespace, event = %event, "dropping emit for detached namespace");
                            continue;
                        }
                        let packet = Packet::event(namespace.clone(), event.clone(), payload.clone());
                        if let Err(error) = handle.send(packet).await {
                            warn!(%error, "connection lost mid-emit; re-buffering");
                            self.pending.push_front((namespace, event, payload));
                            drop(handle);
                            return self.handle_connection_loss(command_rx).await;
                        }
                    }
                    Some(Command::DisconnectSocket { namespace, ack }) => {
                        if self.remove_socket(&namespace) {
                            // Best effort; a send failure here surfaces as
                            // EOF on the next recv.
                            let _ = handle.send(Packet::Disconnect { namespace }).await;
                        }
                        let _ = ack.send(());
                        if self.sockets.is_empty() && self.options.close_on_last_socket {
                            debug!("last socket detached; closing transport");
                            handle.close().await;
                            self.state = ConnectionState::Disconnected;
                            return Flow::Continue;
                        }
                    }
                    Some(Command::Close { ack }) => {
                        handle.close().await;
                        self.finish_close();
                        let _ = ack.send(());
                        return Flow::Stop;
                    }
                    Some(Command::State { ack }) => {
                        let _ = ack.send(self.state);
                    }
                },
                frame = handle.recv() => match frame {
                    Some(packet) => self.route_packet(packet),
                    None => {
                        warn!("transport stream ended unexpectedly");
                        drop(handle);
                        return self.handle_connection_loss(command_rx).await;
                    }
                },
            }
        }
    }

    /// Routes one inbound frame to its socket.
    fn route_packet(&self, packet: Packet) {
        match packet {
            Packet::Event {
                namespace,
                event,
                payload,
            } => match self.find_socket(&namespace) {
                Some(shared) => {
                    trace!(%namespace, event = %event, "routing inbound event");
                    shared.dispatch_event(&event, &payload);
                }
                None => debug!(%namespace, event = %event, "dropping event for unknown namespace"),
            },
            Packet::ConnectAck { namespace } => {
                debug!(%namespace, "handshake acknowledged");
                if let Some(shared) = self.find_socket(&namespace) {
                    shared.dispatch_lifecycle(&LifecycleEvent::Connected);
                }
            }
            Packet::ConnectError {
                namespace,
                code,
                message,
            } => {
                warn!(%namespace, ?code, message = %message, "handshake rejected by remote");
                if let Some(shared) = self.find_socket(&namespace) {
                    shared.dispatch_lifecycle(&LifecycleEvent::ReconnectFailed { message });
                }
            }
            Packet::Disconnect { namespace } => {
                if let Some(shared) = self.find_socket(&namespace) {
                    shared.dispatch_lifecycle(&LifecycleEvent::Disconnected);
                }
            }
            Packet::Connect { namespace, .. } => {
                debug!(%namespace, "ignoring connect frame from remote");
            }
        }
    }

    // ========================================================================
    // Reconnection
    // ========================================================================

    /// Handles an unexpected transport loss.
    async fn handle_connection_loss(
        &mut self,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Flow {
        self.state = ConnectionState::Disconnected;
        self.notify_all(&LifecycleEvent::Disconnected);

        if self.options.reconnection.enabled {
            self.run_reconnect_loop(command_rx).await
        } else {
            debug!("reconnection disabled; staying disconnected");
            Flow::Continue
        }
    }

    /// Retries the connection with exponential back-off until it is
    /// restored, the retry budget is exhausted, or the manager is closed.
    ///
    /// The attempt counter starts fresh on every entry, so a recovered
    /// connection that is lost again backs off from the initial delay.
    async fn run_reconnect_loop(
        &mut self,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Flow {
        self.state = ConnectionState::Reconnecting;
        let mut attempt: u32 = 0;

        loop {
            if let Some(max) = self.options.reconnection.max_attempts {
                if attempt >= max {
                    warn!(attempts = max, "reconnection retry budget exhausted");
                    self.notify_all(&LifecycleEvent::ReconnectExhausted { attempts: max });
                    self.finish_close();
                    return Flow::Stop;
                }
            }

            let delay = self.options.reconnection.delay_for_attempt(attempt);
            attempt += 1;
            debug!(attempt, ?delay, "scheduling reconnection attempt");
            self.notify_all(&LifecycleEvent::ReconnectAttempt { attempt, delay });

            if matches!(self.sleep_with_commands(delay, command_rx).await, Flow::Stop) {
                return Flow::Stop;
            }

            match self.establish().await {
                Ok(handle) => {
                    info!(attempt, "connection restored");
                    self.handle = Some(handle);
                    self.state = ConnectionState::Connected;
                    return Flow::Continue;
                }
                Err(error) if error.is_auth_rejected() => {
                    // Retrying with the same payload would fail identically;
                    // wait for the caller to supply new auth and reconnect
                    // explicitly.
                    warn!(%error, "auth rejected during reconnection; stopping retries");
                    self.notify_all(&LifecycleEvent::ReconnectFailed {
                        message: error.to_string(),
                    });
                    self.state = ConnectionState::Disconnected;
                    return Flow::Continue;
                }
                Err(error) => {
                    warn!(%error, attempt, "reconnection attempt failed");
                    self.notify_all(&LifecycleEvent::ReconnectFailed {
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    /// Sleeps out a back-off delay while still servicing commands.
    ///
    /// Racing the timer against the command channel is what lets `close`
    /// cancel a pending attempt immediately.
    async fn sleep_with_commands(
        &mut self,
        delay: Duration,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return Flow::Continue,
                command = command_rx.recv() => match command {
                    None => {
                        self.finish_close();
                        return Flow::Stop;
                    }
                    Some(Command::Close { ack }) => {
                        debug!("close received; cancelling scheduled reconnection");
                        self.finish_close();
                        let _ = ack.send(());
                        return Flow::Stop;
                    }
                    Some(Command::Connect { ack }) => {
                        let _ = ack.send(Err(Error::connection(
                            "reconnection in progress",
                        )));
                    }
                    Some(Command::OpenSocket { shared, delay_max, ack }) => {
                        let (shared, _) = self.register_or_existing(shared, delay_max);
                        let _ = ack.send(shared);
                    }
                    Some(Command::Emit { namespace, event, payload }) => {
                        self.buffer_emit(namespace, event, payload);
                    }
                    Some(Command::DisconnectSocket { namespace, ack }) => {
                        self.remove_socket(&namespace);
                        let _ = ack.send(());
                    }
                    Some(Command::State { ack }) => {
                        let _ = ack.send(self.state);
                    }
                },
            }
        }
    }

    // ========================================================================
    // Connection Establishment
    // ========================================================================

    /// Opens a transport and completes the handshake, bounded by the
    /// connect timeout.
    async fn establish(&mut self) -> Result<Box<dyn TransportHandle>> {
        let timeout = self.options.connect_timeout;
        match tokio::time::timeout(timeout, self.open_and_handshake()).await {
            Ok(result) => result,
            Err(_) => Err(Error::connection_timeout(timeout.as_millis() as u64)),
        }
    }

    async fn open_and_handshake(&mut self) -> Result<Box<dyn TransportHandle>> {
        let mut handle = self.open_transport().await?;
        self.handshake(&mut handle).await?;
        Ok(handle)
    }

    /// Walks the transport preference order and opens the first that works.
    async fn open_transport(&self) -> Result<Box<dyn TransportHandle>> {
        let mut last_error = None;

        for &kind in &self.options.transports {
            let Some(transport) = self.registry.get(kind) else {
                let error = Error::transport_unavailable(kind);
                if self.options.strict_transport {
                    return Err(error);
                }
                debug!(%kind, "no transport registered; trying next preference");
                last_error = Some(error);
                continue;
            };

            match transport.open(&self.endpoint).await {
                Ok(handle) => {
                    debug!(%kind, endpoint = self.endpoint.as_str(), "transport opened");
                    return Ok(handle);
                }
                Err(error @ Error::TransportUnavailable { .. }) => {
                    if self.options.strict_transport {
                        return Err(error);
                    }
                    debug!(%kind, "transport unavailable; trying next preference");
                    last_error = Some(error);
                }
                Err(error) => {
                    warn!(%kind, %error, "transport open failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::connection("no transport could be opened")))
    }

    /// Handshakes every registered socket over a fresh connection, in
    /// creation order.
    ///
    /// Auth and query are read at call time, so payloads replaced since
    /// the last attempt are picked up here.
    async fn handshake(&self, handle: &mut Box<dyn TransportHandle>) -> Result<()> {
        for shared in &self.sockets {
            let request = Packet::Connect {
                namespace: shared.namespace.clone(),
                auth: shared.auth.lock().clone(),
                query: shared.query.lock().clone(),
            };
            handle.send(request).await?;

            loop {
                match handle.recv().await {
                    Some(Packet::ConnectAck { namespace }) if namespace == shared.namespace => {
                        debug!(%namespace, "handshake acknowledged");
                        break;
                    }
                    Some(Packet::ConnectError {
                        namespace,
                        code,
                        message,
                    }) if namespace == shared.namespace => {
                        return Err(match code {
                            ConnectErrorCode::AuthFailed => {
                                Error::auth_rejected(namespace.as_str(), message)
                            }
                            ConnectErrorCode::Rejected => Error::connection(format!(
                                "handshake rejected for {namespace}: {message}"
                            )),
                        });
                    }
                    Some(packet) => self.route_packet(packet),
                    None => return Err(Error::connection("transport closed during handshake")),
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Socket Registry
    // ========================================================================

    fn find_socket(&self, namespace: &Namespace) -> Option<&Arc<SocketShared>> {
        self.sockets.iter().find(|s| s.namespace == *namespace)
    }

    /// Registers a socket, or resolves the existing one for its namespace.
    ///
    /// Returns the registered shared state and whether it is new.
    fn register_or_existing(
        &mut self,
        shared: Arc<SocketShared>,
        delay_max: Option<Duration>,
    ) -> (Arc<SocketShared>, bool) {
        if let Some(delay) = delay_max {
            self.options.reconnection.max_delay = delay;
        }
        if let Some(existing) = self.find_socket(&shared.namespace) {
            return (Arc::clone(existing), false);
        }
        debug!(namespace = %shared.namespace, "socket registered");
        self.sockets.push(Arc::clone(&shared));
        (shared, true)
    }

    /// Detaches a socket and discards its buffered emits.
    fn remove_socket(&mut self, namespace: &Namespace) -> bool {
        let before = self.sockets.len();
        self.sockets.retain(|s| s.namespace != *namespace);
        self.pending.retain(|(ns, _, _)| ns != namespace);
        self.sockets.len() != before
    }

    // ========================================================================
    // Emit Buffer
    // ========================================================================

    /// Queues an emit until the next transition to connected.
    fn buffer_emit(&mut self, namespace: Namespace, event: String, payload: Value) {
        if self.find_socket(&namespace).is_none() {
            debug!(%namespace, event = %event, "dropping emit for detached namespace");
            return;
        }
        trace!(%namespace, event = %event, buffered = self.pending.len() + 1, "buffering emit");
        self.pending.push_back((namespace, event, payload));
    }

    /// Writes out the buffered emits in FIFO order.
    ///
    /// On a send failure the failed emit goes back to the front of the
    /// queue so nothing is lost or reordered across the retry.
    async fn flush_pending(&mut self, handle: &mut Box<dyn TransportHandle>) -> Result<()> {
        while let Some((namespace, event, payload)) = self.pending.pop_front() {
            let packet = Packet::event(namespace.clone(), event.clone(), payload.clone());
            if let Err(error) = handle.send(packet).await {
                self.pending.push_front((namespace, event, payload));
                return Err(error);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Notifications and Teardown
    // ========================================================================

    /// Delivers one lifecycle notification to every socket, in creation
    /// order.
    fn notify_all(&self, event: &LifecycleEvent) {
        for shared in &self.sockets {
            shared.dispatch_lifecycle(event);
        }
    }

    /// Transitions to the terminal state, discarding buffered emits.
    fn finish_close(&mut self) {
        self.state = ConnectionState::Closed;
        if !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "discarding buffered emits on close");
            self.pending.clear();
        }
        self.notify_all(&LifecycleEvent::Closed);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::options::ReconnectionPolicy;
    use crate::protocol::AuthPayload;
    use crate::transport::{MemoryConnection, MemoryServer, MemoryTransport, TransportKind};
    use serde_json::json;
    use tokio_test::assert_ok;

    const URL: &str = "http://example.test:8080";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn fast_policy() -> ReconnectionPolicy {
        ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(40))
    }

    fn memory_manager(policy: ReconnectionPolicy) -> (Manager, MemoryServer) {
        init_tracing();
        let (transport, server) = MemoryTransport::new();
        let manager = Manager::builder()
            .url(URL)
            .transports([TransportKind::Memory])
            .reconnection(policy)
            .register(Box::new(transport))
            .build()
            .expect("build");
        (manager, server)
    }

    /// Accepts a connection and acks the first handshake frame on it.
    async fn accept_and_ack(server: &mut MemoryServer) -> MemoryConnection {
        let mut conn = server.accept().await.expect("accept");
        match conn.recv().await {
            Some(Packet::Connect { namespace, .. }) => {
                assert!(conn.send(Packet::ConnectAck { namespace }));
            }
            other => panic!("expected connect frame, got {other:?}"),
        }
        conn
    }

    fn lifecycle_channel(socket: &Socket) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        socket.on_lifecycle(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    async fn next_lifecycle(rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> LifecycleEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("lifecycle event within deadline")
            .expect("lifecycle channel open")
    }

    #[tokio::test]
    async fn test_connect_handshake_and_emit() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::new());
        let socket = manager
            .socket(
                "/",
                SocketOptions::new()
                    .with_auth_entry("token", "123")
                    .with_query_entry("my-key", "my-value"),
            )
            .await
            .expect("socket");

        let server_side = async {
            let mut conn = server.accept().await.expect("accept");
            match conn.recv().await {
                Some(Packet::Connect {
                    namespace,
                    auth,
                    query,
                }) => {
                    assert!(namespace.is_root());
                    assert_eq!(auth.get("token"), Some(&json!("123")));
                    assert_eq!(query.get("my-key"), Some(&"my-value".to_string()));
                    assert!(conn.send(Packet::ConnectAck { namespace }));
                }
                other => panic!("expected connect frame, got {other:?}"),
            }
            conn
        };
        let (result, mut conn) = tokio::join!(manager.connect(), server_side);
        assert_ok!(result);
        assert_eq!(manager.state().await, ConnectionState::Connected);

        socket.emit("message", json!({ "lobbyId": "123" }));
        assert_eq!(
            conn.recv().await,
            Some(Packet::event(
                Namespace::root(),
                "message",
                json!({ "lobbyId": "123" })
            ))
        );
    }

    #[tokio::test]
    async fn test_emits_before_connect_flushed_in_order() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::new());
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");

        for seq in 0..3 {
            socket.emit("message", json!({ "seq": seq }));
        }

        let (result, mut conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");

        for seq in 0..3 {
            assert_eq!(
                conn.recv().await,
                Some(Packet::event(
                    Namespace::root(),
                    "message",
                    json!({ "seq": seq })
                ))
            );
        }
    }

    #[tokio::test]
    async fn test_inbound_events_reach_handlers() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::new());
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");

        let (payload_tx, mut payload_rx) = mpsc::unbounded_channel();
        socket
            .on("joined", move |payload| {
                let _ = payload_tx.send(payload.clone());
            })
            .expect("register handler");

        let (result, conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");

        assert!(conn.send(Packet::event(
            Namespace::root(),
            "joined",
            json!({ "ok": true })
        )));

        let payload = tokio::time::timeout(Duration::from_secs(2), payload_rx.recv())
            .await
            .expect("event within deadline")
            .expect("handler invoked");
        assert_eq!(payload, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_rejected_auth_replaced_before_retry() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::disabled());
        let socket = manager
            .socket("/", SocketOptions::new().with_auth_entry("token", "bad"))
            .await
            .expect("socket");

        let reject = async {
            let mut conn = server.accept().await.expect("accept");
            match conn.recv().await {
                Some(Packet::Connect { namespace, .. }) => {
                    assert!(conn.send(Packet::ConnectError {
                        namespace,
                        code: ConnectErrorCode::AuthFailed,
                        message: "bad token".to_string(),
                    }));
                }
                other => panic!("expected connect frame, got {other:?}"),
            }
        };
        let (result, ()) = tokio::join!(manager.connect(), reject);
        assert!(matches!(result, Err(Error::AuthRejected { .. })));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        let mut auth = AuthPayload::new();
        auth.insert("token".to_string(), json!("123"));
        socket.set_auth(auth);

        let accept = async {
            let mut conn = server.accept().await.expect("accept");
            match conn.recv().await {
                Some(Packet::Connect {
                    namespace, auth, ..
                }) => {
                    assert_eq!(auth.get("token"), Some(&json!("123")));
                    assert!(conn.send(Packet::ConnectAck { namespace }));
                }
                other => panic!("expected connect frame, got {other:?}"),
            }
            conn
        };
        let (result, _conn) = tokio::join!(manager.connect(), accept);
        result.expect("connect with replaced auth");
    }

    #[tokio::test]
    async fn test_strict_transport_fails_fast() {
        let (transport, server) = MemoryTransport::new();
        let transport = transport.with_kind(TransportKind::WebTransport);
        server.set_unavailable(true);

        let manager = Manager::builder()
            .url(URL)
            .transports([TransportKind::WebTransport, TransportKind::Memory])
            .strict_transport()
            .register(Box::new(transport))
            .build()
            .expect("build");

        let result = manager.connect().await;
        assert!(matches!(
            result,
            Err(Error::TransportUnavailable {
                kind: TransportKind::WebTransport
            })
        ));
        assert_eq!(server.open_attempts(), 1);
    }

    #[tokio::test]
    async fn test_transport_preference_fall_through() {
        let (preferred, preferred_server) = MemoryTransport::new();
        let preferred = preferred.with_kind(TransportKind::WebTransport);
        preferred_server.set_unavailable(true);

        let (fallback, mut fallback_server) = MemoryTransport::new();

        let manager = Manager::builder()
            .url(URL)
            .transports([TransportKind::WebTransport, TransportKind::Memory])
            .register(Box::new(preferred))
            .register(Box::new(fallback))
            .build()
            .expect("build");
        let _socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");

        let (result, _conn) =
            tokio::join!(manager.connect(), accept_and_ack(&mut fallback_server));
        result.expect("connect over fallback");

        assert_eq!(preferred_server.open_attempts(), 1);
        assert_eq!(fallback_server.open_attempts(), 1);
    }

    #[tokio::test]
    async fn test_connect_fails_when_no_transport_reachable() {
        let (manager, server) = memory_manager(ReconnectionPolicy::disabled());
        server.set_refuse(true);

        let result = manager.connect().await;
        assert!(matches!(result, Err(Error::Connection { .. })));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_cancels_scheduled_reconnect() {
        // The first retry is an hour out; close must not wait for it.
        let policy = fast_policy().with_initial_delay(Duration::from_secs(3600));
        let (manager, mut server) = memory_manager(policy);
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");
        let mut lifecycle = lifecycle_channel(&socket);

        let (result, conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);

        conn.close();
        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::Disconnected
        );
        assert!(matches!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::ReconnectAttempt { attempt: 1, .. }
        ));

        manager.close().await;
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Closed);
        assert_eq!(server.open_attempts(), 1);
        assert_eq!(manager.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_closes_manager() {
        let (manager, mut server) = memory_manager(fast_policy().with_max_attempts(3));
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");
        let mut lifecycle = lifecycle_channel(&socket);

        let (result, conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);

        server.set_refuse(true);
        conn.close();

        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::Disconnected
        );
        for expected in 1..=3 {
            assert!(matches!(
                next_lifecycle(&mut lifecycle).await,
                LifecycleEvent::ReconnectAttempt { attempt, .. } if attempt == expected
            ));
            assert!(matches!(
                next_lifecycle(&mut lifecycle).await,
                LifecycleEvent::ReconnectFailed { .. }
            ));
        }
        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::ReconnectExhausted { attempts: 3 }
        );
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Closed);

        // 1 initial connect + 3 refused retries.
        assert_eq!(server.open_attempts(), 4);
        assert_eq!(manager.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_attempt_counter_resets_after_recovery() {
        let (manager, mut server) = memory_manager(fast_policy().with_max_attempts(5));
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");
        let mut lifecycle = lifecycle_channel(&socket);

        let (result, conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);

        // First loss: reject attempt 1 at the handshake, accept attempt 2.
        conn.close();
        let mut conn = server.accept().await.expect("accept attempt 1");
        match conn.recv().await {
            Some(Packet::Connect { namespace, .. }) => {
                assert!(conn.send(Packet::ConnectError {
                    namespace,
                    code: ConnectErrorCode::Rejected,
                    message: "try later".to_string(),
                }));
            }
            other => panic!("expected connect frame, got {other:?}"),
        }
        let conn = accept_and_ack(&mut server).await;

        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::Disconnected
        );
        assert!(matches!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::ReconnectAttempt { attempt: 1, .. }
        ));
        assert!(matches!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::ReconnectFailed { .. }
        ));
        assert!(matches!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::ReconnectAttempt { attempt: 2, .. }
        ));
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);

        // Second loss: the counter starts over at 1.
        conn.close();
        let _conn = accept_and_ack(&mut server).await;
        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::Disconnected
        );
        assert!(matches!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::ReconnectAttempt { attempt: 1, .. }
        ));
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);
    }

    #[tokio::test]
    async fn test_socket_delay_max_caps_backoff() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_secs(60))
            .with_max_attempts(3);
        let (manager, mut server) = memory_manager(policy);

        // The socket's cap overrides the manager's 60s cap.
        let socket = manager
            .socket(
                "/",
                SocketOptions::new().with_reconnection_delay_max(Duration::from_millis(20)),
            )
            .await
            .expect("socket");
        let mut lifecycle = lifecycle_channel(&socket);

        let (result, conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);

        server.set_refuse(true);
        conn.close();
        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::Disconnected
        );

        let mut delays = Vec::new();
        while delays.len() < 3 {
            if let LifecycleEvent::ReconnectAttempt { delay, .. } =
                next_lifecycle(&mut lifecycle).await
            {
                delays.push(delay.as_millis() as u64);
            }
        }
        assert_eq!(delays, vec![10, 20, 20]);
    }

    #[tokio::test]
    async fn test_last_socket_disconnect_closes_transport() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::new());
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");

        let (result, mut conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");

        socket.disconnect().await;

        assert_eq!(
            conn.recv().await,
            Some(Packet::Disconnect {
                namespace: Namespace::root()
            })
        );
        assert_eq!(conn.recv().await, None);
        assert_eq!(server.close_count(), 1);
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_keep_alive_retains_transport() {
        let (transport, mut server) = MemoryTransport::new();
        let manager = Manager::builder()
            .url(URL)
            .transports([TransportKind::Memory])
            .keep_alive()
            .register(Box::new(transport))
            .build()
            .expect("build");
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");

        let (result, mut conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");

        socket.disconnect().await;

        assert_eq!(
            conn.recv().await,
            Some(Packet::Disconnect {
                namespace: Namespace::root()
            })
        );
        assert_eq!(server.close_count(), 0);
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_same_namespace_resolves_to_same_socket() {
        let (manager, _server) = memory_manager(ReconnectionPolicy::new());

        let first = manager
            .socket("/lobby", SocketOptions::new())
            .await
            .expect("socket");
        let second = manager
            .socket("/lobby", SocketOptions::new())
            .await
            .expect("socket");

        assert!(Arc::ptr_eq(&first.shared, &second.shared));
    }

    #[tokio::test]
    async fn test_invalid_namespace_rejected() {
        let (manager, _server) = memory_manager(ReconnectionPolicy::new());

        assert!(matches!(
            manager.socket("lobby", SocketOptions::new()).await,
            Err(Error::InvalidNamespace { .. })
        ));
        assert!(matches!(
            manager.socket("", SocketOptions::new()).await,
            Err(Error::InvalidNamespace { .. })
        ));
    }

    #[tokio::test]
    async fn test_state_reflects_transitions() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::disabled());
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        // No sockets registered, so the handshake is empty.
        let (result, conn) = tokio::join!(manager.connect(), async {
            server.accept().await.expect("accept")
        });
        result.expect("connect");
        assert_eq!(manager.state().await, ConnectionState::Connected);

        manager.close().await;
        assert_eq!(manager.state().await, ConnectionState::Closed);
        drop(conn);
    }

    #[tokio::test]
    async fn test_connect_times_out_without_ack() {
        let (transport, mut server) = MemoryTransport::new();
        let manager = Manager::builder()
            .url(URL)
            .transports([TransportKind::Memory])
            .connect_timeout(Duration::from_millis(50))
            .register(Box::new(transport))
            .build()
            .expect("build");
        let _socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");

        let server_side = async {
            let mut conn = server.accept().await.expect("accept");
            // Swallow the handshake frame and never ack.
            let _ = conn.recv().await;
            conn
        };
        let (result, _conn) = tokio::join!(manager.connect(), server_side);
        assert!(matches!(result, Err(Error::ConnectionTimeout { .. })));
    }

    #[tokio::test]
    async fn test_reconnection_disabled_stays_disconnected() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::disabled());
        let socket = manager
            .socket("/", SocketOptions::new())
            .await
            .expect("socket");
        let mut lifecycle = lifecycle_channel(&socket);

        let (result, conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("connect");
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);

        conn.close();
        assert_eq!(
            next_lifecycle(&mut lifecycle).await,
            LifecycleEvent::Disconnected
        );
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert_eq!(server.open_attempts(), 1);

        // An explicit connect still works after the loss.
        let (result, _conn) = tokio::join!(manager.connect(), accept_and_ack(&mut server));
        result.expect("explicit reconnect");
    }

    #[tokio::test]
    async fn test_socket_opened_while_connected_handshakes() {
        let (manager, mut server) = memory_manager(ReconnectionPolicy::new());

        let (result, mut conn) = tokio::join!(manager.connect(), async {
            server.accept().await.expect("accept")
        });
        result.expect("connect");

        let socket = manager
            .socket("/lobby", SocketOptions::new().with_auth_entry("token", "123"))
            .await
            .expect("socket");
        let mut lifecycle = lifecycle_channel(&socket);

        match conn.recv().await {
            Some(Packet::Connect {
                namespace, auth, ..
            }) => {
                assert_eq!(namespace.as_str(), "/lobby");
                assert_eq!(auth.get("token"), Some(&json!("123")));
                assert!(conn.send(Packet::ConnectAck { namespace }));
            }
            other => panic!("expected connect frame, got {other:?}"),
        }
        assert_eq!(next_lifecycle(&mut lifecycle).await, LifecycleEvent::Connected);
    }
}
