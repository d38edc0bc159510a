//! Wire protocol message types.
//!
//! Defines the frames exchanged between the local end (this client) and the
//! remote end (server) over a transport: handshake, handshake results,
//! events, and logical disconnects.
//!
//! # Frame Types
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `connect` | local → remote | Open a logical channel, carries auth + query |
//! | `connectAck` | remote → local | Handshake accepted |
//! | `connectError` | remote → local | Handshake rejected |
//! | `event` | both | Named event with JSON payload |
//! | `disconnect` | local → remote | Tear down a logical channel |

// ============================================================================
// Submodules
// ============================================================================

/// Packet definitions and serialization.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use packet::{AuthPayload, ConnectErrorCode, Packet, QueryParams};
