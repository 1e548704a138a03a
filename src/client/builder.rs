//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gql_transport_ws::{Client, WebSocketTransport};
//!
//! # async fn example() -> gql_transport_ws::Result<()> {
//! let client = Client::builder(WebSocketTransport::new("wss://api.example.com/graphql")?)
//!     .auto_connect(false)
//!     .connection_ack_timeout(Duration::from_secs(10))
//!     .on_error(|error| eprintln!("connection lost: {error}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::Transport;

use super::ErrorHandler;
use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
pub struct ClientBuilder {
    /// Transport used for every connection.
    transport: Arc<dyn Transport>,
    /// Engine options.
    options: ClientOptions,
    /// Sink for connection-wide failures.
    on_error: Option<ErrorHandler>,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
            options: ClientOptions::default(),
            on_error: None,
        }
    }

    /// Enables or disables auto-connect (enabled by default).
    #[inline]
    #[must_use]
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.options.auto_connect = enabled;
        self
    }

    /// Stops the connection if `connection_ack` does not arrive in time.
    #[inline]
    #[must_use]
    pub fn connection_ack_timeout(mut self, timeout: Duration) -> Self {
        self.options.connection_ack_timeout = Some(timeout);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the handler for connection-wide failures.
    ///
    /// Called after the engine stopped because the transport failed, a
    /// frame could not be decoded, the acknowledgement timed out, or an
    /// auto-connect attempt failed. Runs on the engine task.
    #[inline]
    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Builds the client and spawns its engine task.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if called outside a tokio runtime
    /// - [`Error::Config`] if the acknowledgement timeout is zero
    pub fn build(self) -> Result<Client> {
        self.validate()?;

        Ok(Client::spawn(self.transport, self.options, self.on_error))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate(&self) -> Result<()> {
        if Handle::try_current().is_err() {
            return Err(Error::config(
                "Client must be built inside a tokio runtime.\n\
                 Example: #[tokio::main] async fn main() { ... }",
            ));
        }

        if self.options.connection_ack_timeout == Some(Duration::ZERO) {
            return Err(Error::config("connection_ack_timeout must be non-zero"));
        }

        Ok(())
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
