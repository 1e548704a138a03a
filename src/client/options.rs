//! Client behavior options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gql_transport_ws::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_auto_connect(false)
//!     .with_connection_ack_timeout(Duration::from_secs(10));
//!
//! assert!(!options.auto_connect);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// ClientOptions
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Start the connection implicitly when subscribing before `start`.
    ///
    /// Uses the most recent connection params, or `{}` if `start` was
    /// never called.
    pub auto_connect: bool,

    /// Give up on the connection when `connection_ack` does not arrive
    /// within this duration after `connection_init` was sent.
    pub connection_ack_timeout: Option<Duration>,
}

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            auto_connect: true,
            connection_ack_timeout: None,
        }
    }

    /// Enables or disables auto-connect.
    #[inline]
    #[must_use]
    pub const fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Sets the acknowledgement timeout.
    #[inline]
    #[must_use]
    pub const fn with_connection_ack_timeout(mut self, timeout: Duration) -> Self {
        self.connection_ack_timeout = Some(timeout);
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
