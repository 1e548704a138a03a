//! graphql-transport-ws message types.
//!
//! This module defines the frame envelope exchanged with the server and
//! the JSON payloads carried inside it.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `connection_init` | Client → Server | Bootstrap with connection params |
//! | `connection_ack` | Server → Client | Bootstrap accepted |
//! | `subscribe` | Client → Server | Open a subscription |
//! | `next` | Server → Client | One execution result |
//! | `error` | Server → Client | Operation failed, list of errors |
//! | `complete` | Both | Subscription finished or cancelled |
//! | `ping` / `pong` | Both | Keep-alive |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame envelope and codec |
//! | `payload` | Subscribe payload, execution results, GraphQL errors |

// ============================================================================
// Submodules
// ============================================================================

/// Frame envelope and codec.
pub mod frame;

/// Payload types carried inside frames.
pub mod payload;

// ============================================================================
// Constants
// ============================================================================

/// Subprotocol token requested during the WebSocket handshake.
pub const GRAPHQL_TRANSPORT_WS_PROTOCOL: &str = "graphql-transport-ws";

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, FrameKind, decode, encode};
pub use payload::{ExecutionResult, GraphQLError, Location, SubscribePayload};
