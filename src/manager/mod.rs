//! Connection manager.
//!
//! The manager owns one physical connection to a server endpoint, applies
//! the reconnection policy, and is the factory for namespace-scoped
//! sockets.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  commands   ┌─────────────────┐   frames   ┌───────────┐
//! │ Socket/  │────────────►│  control loop   │◄──────────►│ Transport │
//! │ Manager  │   (mpsc)    │ (single writer) │            │  handle   │
//! └──────────┘             └─────────────────┘            └───────────┘
//! ```
//!
//! All state transitions and timer callbacks execute on one control-loop
//! task; socket operations are serialized with respect to transitions by
//! queueing commands into it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent manager construction |
//! | `core` | Manager handle and control loop |
//! | `options` | Manager, reconnection, and socket options |
//! | `state` | Connection state and lifecycle notifications |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent manager construction.
pub mod builder;

/// Internal control-loop commands.
pub(crate) mod command;

/// Manager handle and control loop.
pub mod core;

/// Manager, reconnection, and socket options.
pub mod options;

/// Connection state and lifecycle notifications.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ManagerBuilder;
pub use self::core::Manager;
pub use options::{ManagerOptions, ReconnectionPolicy, SocketOptions};
pub use state::{ConnectionState, LifecycleEvent};
