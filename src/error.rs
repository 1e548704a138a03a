//! Error types for the subscription client.
//!
//! Every failure the client can surface is a variant of [`Error`]. Most
//! are delivered to the `on_event` callback of the subscription that
//! caused them; start-time failures are returned from
//! [`Client::start`](crate::Client::start), and connection-wide failures
//! go to the engine error sink configured with
//! [`ClientBuilder::on_error`](crate::ClientBuilder::on_error).
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Start | [`Error::AlreadyStarted`], [`Error::EncodeConnectionParamsFailed`], [`Error::ConnectionInitFailed`] |
//! | Subscribe | [`Error::NotStartedAndNoAutoConnect`], [`Error::EncodeSelectionFailed`], [`Error::SubscribeFailed`] |
//! | Event | [`Error::DecodeSelectionFailed`], [`Error::RemoteErrors`], [`Error::DecodeErrorsFailed`], [`Error::StreamComplete`] |
//! | Codec | [`Error::EncodingFailed`], [`Error::MalformedFrame`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::AckTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`], [`Error::Config`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::GraphQLError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Start Errors
    // ========================================================================
    /// `start` was called while a connection already exists.
    #[error("Client already started")]
    AlreadyStarted,

    /// Connection parameters could not be serialized.
    #[error("Failed to encode connection params: {message}")]
    EncodeConnectionParamsFailed {
        /// Serializer message.
        message: String,
    },

    /// The transport could not be opened, or `connection_init` could not
    /// be sent.
    #[error("Connection init failed: {message}")]
    ConnectionInitFailed {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Subscribe Errors
    // ========================================================================
    /// Subscribed before `start` with auto-connect disabled.
    #[error("Client not started and auto-connect is disabled")]
    NotStartedAndNoAutoConnect,

    /// The subscription payload could not be built.
    #[error("Failed to encode selection: {message}")]
    EncodeSelectionFailed {
        /// Serializer message.
        message: String,
    },

    /// The `subscribe` frame could not be sent.
    #[error("Subscribe failed: {message}")]
    SubscribeFailed {
        /// Description of the send failure.
        message: String,
    },

    // ========================================================================
    // Event Errors
    // ========================================================================
    /// A `next` payload did not decode into the selection's output.
    #[error("Failed to decode selection: {message}")]
    DecodeSelectionFailed {
        /// Deserializer message.
        message: String,
    },

    /// The server reported GraphQL errors for the operation.
    #[error("Server returned {} error(s)", .0.len())]
    RemoteErrors(Vec<GraphQLError>),

    /// An `error` payload was not a list of GraphQL errors.
    #[error("Failed to decode errors: {message}")]
    DecodeErrorsFailed {
        /// Deserializer message.
        message: String,
    },

    /// The server completed the subscription.
    #[error("Stream complete")]
    StreamComplete,

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// A frame could not be serialized.
    #[error("Failed to encode frame: {message}")]
    EncodingFailed {
        /// Serializer message.
        message: String,
    },

    /// An inbound frame was unparsable or had an unknown `type`.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport did not connect in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed, by the peer or because the client shut down.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server did not acknowledge `connection_init` in time.
    #[error("No connection_ack after {timeout_ms}ms")]
    AckTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an encode connection params error.
    #[inline]
    pub fn encode_connection_params_failed(message: impl Into<String>) -> Self {
        Self::EncodeConnectionParamsFailed {
            message: message.into(),
        }
    }

    /// Creates a connection init error.
    #[inline]
    pub fn connection_init_failed(message: impl Into<String>) -> Self {
        Self::ConnectionInitFailed {
            message: message.into(),
        }
    }

    /// Creates an encode selection error.
    #[inline]
    pub fn encode_selection_failed(message: impl Into<String>) -> Self {
        Self::EncodeSelectionFailed {
            message: message.into(),
        }
    }

    /// Creates a subscribe error.
    #[inline]
    pub fn subscribe_failed(message: impl Into<String>) -> Self {
        Self::SubscribeFailed {
            message: message.into(),
        }
    }

    /// Creates a decode selection error.
    #[inline]
    pub fn decode_selection_failed(message: impl Into<String>) -> Self {
        Self::DecodeSelectionFailed {
            message: message.into(),
        }
    }

    /// Creates a decode errors error.
    #[inline]
    pub fn decode_errors_failed(message: impl Into<String>) -> Self {
        Self::DecodeErrorsFailed {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    #[inline]
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout: Duration) -> Self {
        Self::ConnectionTimeout {
            timeout_ms: saturating_millis(timeout),
        }
    }

    /// Creates an acknowledgement timeout error.
    #[inline]
    pub fn ack_timeout(timeout: Duration) -> Self {
        Self::AckTimeout {
            timeout_ms: saturating_millis(timeout),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Whole milliseconds, clamped to `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the server completed the subscription.
    #[inline]
    #[must_use]
    pub fn is_stream_complete(&self) -> bool {
        matches!(self, Self::StreamComplete)
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionInitFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::AckTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns the GraphQL errors carried by [`Error::RemoteErrors`].
    #[inline]
    #[must_use]
    pub fn remote_errors(&self) -> Option<&[GraphQLError]> {
        match self {
            Self::RemoteErrors(errors) => Some(errors.as_slice()),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection_init_failed("socket closed");
        assert_eq!(err.to_string(), "Connection init failed: socket closed");
    }

    #[test]
    fn test_remote_errors_display() {
        let err = Error::RemoteErrors(vec![
            GraphQLError::new("first"),
            GraphQLError::new("second"),
        ]);
        assert_eq!(err.to_string(), "Server returned 2 error(s)");
        assert_eq!(err.remote_errors().map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::ack_timeout(Duration::from_millis(100)).is_connection_error());
        assert!(Error::connection_init_failed("x").is_connection_error());
        assert!(!Error::StreamComplete.is_connection_error());
        assert!(!Error::NotStartedAndNoAutoConnect.is_connection_error());
    }

    #[test]
    fn test_timeout_millis() {
        assert!(matches!(
            Error::ack_timeout(Duration::from_millis(250)),
            Error::AckTimeout { timeout_ms: 250 }
        ));
        assert!(matches!(
            Error::connection_timeout(Duration::MAX),
            Error::ConnectionTimeout {
                timeout_ms: u64::MAX
            }
        ));
        assert_eq!(
            Error::ack_timeout(Duration::MAX).to_string(),
            format!("No connection_ack after {}ms", u64::MAX)
        );
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
