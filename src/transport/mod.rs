//! Transport layer.
//!
//! The engine talks to the server through the [`Transport`] trait: one
//! call opens a connection and yields a [`TransportLink`], a sink of
//! outbound frame texts paired with a stream of inbound frame texts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client engine  │        TransportLink         │  GraphQL        │
//! │                 │   sink ──────────────────►   │  server         │
//! │  (event loop)   │   stream ◄────────────────   │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Link Contract
//!
//! - A sink error means the frame was not sent.
//! - A stream error, or the stream ending, means the connection is gone.
//!   A link is never reused after that; the engine connects again on the
//!   next `start`.
//! - `connect` runs on its own task and is aborted if the client stops
//!   before it finishes. The sink is driven by a separate writer task.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | WebSocket transport over `tokio-tungstenite` |
//! | `channel` | In-memory transport for tests |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Sink;
use futures_util::stream::BoxStream;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// In-memory transport.
pub mod channel;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelPeer, ChannelServer, ChannelTransport};
pub use websocket::WebSocketTransport;

// ============================================================================
// Types
// ============================================================================

/// Outbound half of a link: accepts frame texts.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a link: frame texts until the connection ends.
pub type FrameStream = BoxStream<'static, Result<String>>;

// ============================================================================
// TransportLink
// ============================================================================

/// An open connection split into its two directions.
pub struct TransportLink {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl TransportLink {
    /// Creates a link from its halves.
    #[inline]
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLink").finish_non_exhaustive()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Something that can open a duplex, message-framed connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Implementations return a connection error when the peer cannot be
    /// reached.
    async fn connect(&self) -> Result<TransportLink>;
}
