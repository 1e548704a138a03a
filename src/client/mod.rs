//! Subscription client.
//!
//! [`Client`] is a handle to an engine task that multiplexes
//! subscriptions over one transport connection.
//!
//! # Lifecycle
//!
//! 1. `Client::builder(transport).build()` - spawn the engine
//! 2. `Client::start` - connect and send `connection_init`
//! 3. `Client::subscribe` - queued until `connection_ack`, then sent
//! 4. `CancellationToken::cancel` - send `complete` for one subscription
//! 5. `Client::stop` - close the connection, drop open subscriptions
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Client builder |
//! | `core` | Client handle |
//! | `engine` | Event loop and state machine |
//! | `options` | Engine options |
//! | `registry` | Open subscriptions and frame dispatch |
//! | `selection` | Request building and response decoding |
//! | `stream` | Stream adapter |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Error;

// ============================================================================
// Submodules
// ============================================================================

/// Client builder.
pub mod builder;

/// Client handle.
pub mod core;

/// Event loop and state machine.
mod engine;

/// Engine options.
pub mod options;

/// Open subscriptions and frame dispatch.
mod registry;

/// Request building and response decoding.
pub mod selection;

/// Stream adapter.
pub mod stream;

// ============================================================================
// Types
// ============================================================================

/// Engine-level error handler.
///
/// Receives failures that end the whole connection.
pub type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use engine::{ClientStatus, ConnectionState};
pub use options::ClientOptions;
pub use selection::{GraphQLRequest, Selection};
pub use stream::SubscriptionStream;
