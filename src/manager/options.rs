//! Manager and socket configuration options.
//!
//! Provides a type-safe interface for configuring the connection manager:
//! transport preference order, reconnection policy, and per-socket
//! handshake metadata.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use realtime_socket::{ManagerOptions, ReconnectionPolicy, TransportKind};
//!
//! let options = ManagerOptions::new()
//!     .with_transports([TransportKind::WebTransport])
//!     .with_reconnection(
//!         ReconnectionPolicy::new()
//!             .with_initial_delay(Duration::from_millis(100))
//!             .with_max_delay(Duration::from_secs(10)),
//!     );
//!
//! assert_eq!(options.transports, vec![TransportKind::WebTransport]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;

use crate::protocol::{AuthPayload, QueryParams};
use crate::transport::TransportKind;

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first reconnection attempt.
const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound for reconnection back-off.
const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_millis(5000);

/// Default handshake timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// ReconnectionPolicy
// ============================================================================

/// Controls reconnection behavior after an unexpected transport loss.
///
/// The delay before attempt `n` (0-based) is
/// `min(initial_delay * 2^n, max_delay)`. The attempt counter resets on
/// every successful reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,

    /// Delay before the first attempt.
    pub initial_delay: Duration,

    /// Upper bound for back-off growth.
    pub max_delay: Duration,

    /// Retry budget; `None` means unlimited.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectionPolicy {
    /// Creates the default policy: enabled, 1s initial delay, 5s cap,
    /// unlimited attempts.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            initial_delay: DEFAULT_RECONNECTION_DELAY,
            max_delay: DEFAULT_RECONNECTION_DELAY_MAX,
            max_attempts: None,
        }
    }

    /// Creates a policy with reconnection disabled.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            initial_delay: DEFAULT_RECONNECTION_DELAY,
            max_delay: DEFAULT_RECONNECTION_DELAY_MAX,
            max_attempts: None,
        }
    }

    /// Sets the delay before the first attempt.
    #[inline]
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the back-off cap.
    #[inline]
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the retry budget.
    #[inline]
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Computes the delay before the given attempt.
    ///
    /// `attempt` is 0-based: attempt 0 waits `initial_delay`, each later
    /// attempt doubles the previous delay, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 0..attempt {
            delay = std::cmp::min(delay.saturating_mul(2), self.max_delay);
        }
        std::cmp::min(delay, self.max_delay)
    }
}

// ============================================================================
// ManagerOptions
// ============================================================================

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Transport preference order; the first supported kind wins.
    pub transports: Vec<TransportKind>,

    /// Reconnection policy.
    pub reconnection: ReconnectionPolicy,

    /// Fail fast when a preferred transport is unsupported instead of
    /// falling through to the next preference.
    pub strict_transport: bool,

    /// Close the underlying connection when the last socket disconnects.
    pub close_on_last_socket: bool,

    /// Timeout for transport open plus handshake.
    pub connect_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ManagerOptions - Builder Methods
// ============================================================================

impl ManagerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transports: vec![TransportKind::WebSocket],
            reconnection: ReconnectionPolicy::new(),
            strict_transport: false,
            close_on_last_socket: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the transport preference order.
    #[inline]
    #[must_use]
    pub fn with_transports(mut self, kinds: impl IntoIterator<Item = TransportKind>) -> Self {
        self.transports = kinds.into_iter().collect();
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Enables strict transport mode.
    #[inline]
    #[must_use]
    pub fn with_strict_transport(mut self) -> Self {
        self.strict_transport = true;
        self
    }

    /// Keeps the underlying connection open after the last socket
    /// disconnects.
    #[inline]
    #[must_use]
    pub fn with_keep_alive(mut self) -> Self {
        self.close_on_last_socket = false;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if the transport preference list is empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.transports.is_empty() {
            return Err("Transport preference list must not be empty".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// SocketOptions
// ============================================================================

/// Per-socket handshake configuration.
///
/// Auth and query are resent with the socket's *current* values on every
/// (re)connection attempt.
#[derive(Debug, Clone, Default)]
pub struct SocketOptions {
    /// Opaque auth payload sent at handshake time.
    pub auth: AuthPayload,

    /// Query parameters attached to every handshake attempt.
    pub query: QueryParams,

    /// Overrides the manager's back-off cap when set.
    pub reconnection_delay_max: Option<Duration>,
}

impl SocketOptions {
    /// Creates empty socket options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full auth payload.
    #[inline]
    #[must_use]
    pub fn with_auth(mut self, auth: AuthPayload) -> Self {
        self.auth = auth;
        self
    }

    /// Adds one auth entry.
    #[inline]
    #[must_use]
    pub fn with_auth_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.auth.insert(key.into(), value.into());
        self
    }

    /// Sets the full query map.
    #[inline]
    #[must_use]
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Adds one query parameter.
    #[inline]
    #[must_use]
    pub fn with_query_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Overrides the manager's back-off cap.
    #[inline]
    #[must_use]
    pub const fn with_reconnection_delay_max(mut self, delay: Duration) -> Self {
        self.reconnection_delay_max = Some(delay);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectionPolicy::new();
        assert!(policy.enabled);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(5000));
        assert_eq!(policy.max_attempts, None);
    }

    #[test]
    fn test_disabled_policy() {
        let policy = ReconnectionPolicy::disabled();
        assert!(!policy.enabled);
    }

    #[test]
    fn test_delay_sequence_doubles_until_cap() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(10_000));

        let delays: Vec<u64> = (0..9)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis() as u64)
            .collect();

        assert_eq!(
            delays,
            vec![100, 200, 400, 800, 1600, 3200, 6400, 10_000, 10_000]
        );
    }

    #[test]
    fn test_delay_initial_above_cap_is_clamped() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_millis(200));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
    }

    #[test]
    fn test_manager_options_defaults() {
        let options = ManagerOptions::new();
        assert_eq!(options.transports, vec![TransportKind::WebSocket]);
        assert!(!options.strict_transport);
        assert!(options.close_on_last_socket);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_manager_options_builder_chain() {
        let options = ManagerOptions::new()
            .with_transports([TransportKind::WebTransport, TransportKind::WebSocket])
            .with_strict_transport()
            .with_keep_alive()
            .with_connect_timeout(Duration::from_secs(5));

        assert_eq!(options.transports.len(), 2);
        assert!(options.strict_transport);
        assert!(!options.close_on_last_socket);
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_empty_transports() {
        let options = ManagerOptions::new().with_transports([]);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_socket_options_entries() {
        let options = SocketOptions::new()
            .with_auth_entry("token", "123")
            .with_query_entry("my-key", "my-value")
            .with_reconnection_delay_max(Duration::from_secs(10));

        assert_eq!(options.auth.get("token"), Some(&"123".into()));
        assert_eq!(options.query.get("my-key"), Some(&"my-value".to_string()));
        assert_eq!(
            options.reconnection_delay_max,
            Some(Duration::from_secs(10))
        );
    }

    proptest! {
        // The cap and doubling invariants must hold for any configuration:
        // no computed delay exceeds the cap, and below the cap each delay
        // is exactly double its predecessor.
        #[test]
        fn prop_delay_capped_and_doubling(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..60_000,
            attempt in 0u32..32,
        ) {
            let policy = ReconnectionPolicy::new()
                .with_initial_delay(Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_millis(max_ms));

            let delay = policy.delay_for_attempt(attempt);
            prop_assert!(delay <= policy.max_delay);

            if attempt > 0 {
                let previous = policy.delay_for_attempt(attempt - 1);
                prop_assert!(delay >= previous);
                if delay < policy.max_delay {
                    prop_assert_eq!(delay, previous.saturating_mul(2));
                }
            }
        }
    }
}
