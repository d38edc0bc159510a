//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating [`Manager`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use realtime_socket::{Manager, TransportKind};
//!
//! # fn example() -> realtime_socket::Result<()> {
//! let manager = Manager::builder()
//!     .url("http://example.test:8080")
//!     .transports([TransportKind::WebTransport])
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::{Endpoint, Transport, TransportKind, TransportRegistry};

use super::core::Manager;
use super::options::{ManagerOptions, ReconnectionPolicy};

// ============================================================================
// ManagerBuilder
// ============================================================================

/// Builder for configuring a [`Manager`] instance.
///
/// Use [`Manager::builder()`] to create a new builder. `build` spawns the
/// control-loop task and must therefore run inside a tokio runtime.
#[derive(Default)]
pub struct ManagerBuilder {
    /// Target endpoint URL.
    url: Option<String>,
    /// Manager options.
    options: ManagerOptions,
    /// Registered transport implementations.
    registry: TransportRegistry,
}

// ============================================================================
// ManagerBuilder Implementation
// ============================================================================

impl ManagerBuilder {
    /// Creates a new manager builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server endpoint URL.
    ///
    /// # Arguments
    ///
    /// * `url` - Endpoint URL (e.g., "http://example.test:8080")
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the transport preference order; the first supported kind wins.
    #[inline]
    #[must_use]
    pub fn transports(mut self, kinds: impl IntoIterator<Item = TransportKind>) -> Self {
        self.options.transports = kinds.into_iter().collect();
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.options.reconnection = policy;
        self
    }

    /// Fails fast when a preferred transport is unsupported instead of
    /// falling through to the next preference.
    #[inline]
    #[must_use]
    pub fn strict_transport(mut self) -> Self {
        self.options.strict_transport = true;
        self
    }

    /// Keeps the underlying connection open after the last socket
    /// disconnects.
    #[inline]
    #[must_use]
    pub fn keep_alive(mut self) -> Self {
        self.options.close_on_last_socket = false;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Registers a transport implementation under its own kind.
    #[inline]
    #[must_use]
    pub fn register(mut self, transport: Box<dyn Transport>) -> Self {
        self.registry.register(transport);
        self
    }

    /// Builds the manager with validation and spawns its control loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing or cannot be parsed
    /// - [`Error::Config`] if the transport preference list is empty
    pub fn build(self) -> Result<Manager> {
        let url = self.url.ok_or_else(|| {
            Error::config(
                "Endpoint URL is required. Use .url() to set it.\n\
                 Example: Manager::builder().url(\"http://example.test:8080\")",
            )
        })?;

        let endpoint = Endpoint::new(&url)?;
        self.options.validate().map_err(Error::config)?;

        // A preferred kind without a registered implementation is treated
        // as unavailable at connect time, which may be intentional.
        for &kind in &self.options.transports {
            if !self.registry.supports(kind) {
                warn!(%kind, "no transport registered for preferred kind");
            }
        }

        Ok(Manager::spawn(endpoint, self.options, self.registry))
    }
}

// ============================================================================
// Tests
// ============================================================================
