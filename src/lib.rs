//! gql-transport-ws - Subscription-multiplexing GraphQL WebSocket client.
//!
//! This library runs many GraphQL subscriptions over one persistent
//! duplex connection speaking the `graphql-transport-ws` subprotocol.
//!
//! # Architecture
//!
//! - **Engine**: one tokio task owns the connection state machine, the
//!   queue of subscriptions issued before `connection_ack`, and the
//!   registry of open subscriptions
//! - **Client**: cloneable handle sending commands to the engine
//! - **Transport**: pluggable [`Transport`] trait (WebSocket or in-memory)
//!
//! Key design principles:
//!
//! - Subscriptions never block; they are sent, queued, or rejected
//! - Inbound frames are routed by subscription id, in arrival order
//! - Cancelling one subscription never disturbs the shared connection
//! - Connection-wide failures stop the engine and reach an explicit handler
//!
//! # Quick Start
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use gql_transport_ws::{Client, GraphQLRequest, Result, WebSocketTransport};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Debug, Deserialize)]
//! struct Ticks {
//!     ticks: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = WebSocketTransport::new("wss://api.example.com/graphql")?;
//!     let client = Client::builder(transport)
//!         .on_error(|error| eprintln!("connection lost: {error}"))
//!         .build()?;
//!
//!     client.start(&json!({ "authToken": "secret" })).await?;
//!
//!     let mut ticks = client.subscribe_stream(GraphQLRequest::<Ticks>::new("subscription { ticks }"));
//!     while let Some(event) = ticks.next().await {
//!         println!("{:?}", event?);
//!     }
//!
//!     client.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cancel`] | Composable cancellation tokens |
//! | [`client`] | Client handle, builder and engine |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Subscription ids |
//! | [`protocol`] | Frame envelope, codec and payloads |
//! | [`transport`] | Transport trait and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Composable cancellation tokens.
pub mod cancel;

/// Client handle, builder and engine.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// graphql-transport-ws message types.
pub mod protocol;

/// Transport layer.
///
/// Defines the [`Transport`] trait the engine connects through.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Cancellation
pub use cancel::{CancellationToken, DropGuard};

// Client types
pub use client::{
    Client, ClientBuilder, ClientOptions, ClientStatus, ConnectionState, ErrorHandler,
    GraphQLRequest, Selection, SubscriptionStream,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SubscriptionId;

// Protocol types
pub use protocol::{ExecutionResult, Frame, FrameKind, GraphQLError, SubscribePayload};

// Transport types
pub use transport::{ChannelTransport, Transport, TransportLink, WebSocketTransport};
