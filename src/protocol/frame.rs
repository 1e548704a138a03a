//! Frame envelope and codec.
//!
//! Every message on the connection is a JSON object of the form:
//!
//! ```json
//! { "type": "next", "id": "<subscription id>", "payload": { ... } }
//! ```
//!
//! `id` is present for `subscribe`, `next`, `error` and `complete`.
//! `payload` is present for `connection_init`, `subscribe`, `next` and
//! `error`, and optional for `connection_ack`, `ping` and `pong`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;

// ============================================================================
// FrameKind
// ============================================================================

/// The `type` tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Client bootstrap carrying connection params.
    ConnectionInit,
    /// Server accepted the bootstrap.
    ConnectionAck,
    /// Keep-alive request.
    Ping,
    /// Keep-alive response.
    Pong,
    /// Client opens a subscription.
    Subscribe,
    /// Server delivers one execution result.
    Next,
    /// Server reports that the operation failed.
    Error,
    /// Either side ends the subscription.
    Complete,
}

impl FrameKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Subscribe => "subscribe",
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }

    /// Returns `true` if frames of this kind must carry an `id`.
    #[inline]
    #[must_use]
    pub const fn requires_id(self) -> bool {
        matches!(
            self,
            Self::Subscribe | Self::Next | Self::Error | Self::Complete
        )
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: FrameKind,

    /// Subscription the frame belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SubscriptionId>,

    /// Opaque JSON payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Frame {
    /// Creates a `connection_init` frame.
    #[inline]
    #[must_use]
    pub fn connection_init(params: Value) -> Self {
        Self {
            kind: FrameKind::ConnectionInit,
            id: None,
            payload: Some(params),
        }
    }

    /// Creates a `connection_ack` frame.
    #[inline]
    #[must_use]
    pub fn connection_ack() -> Self {
        Self {
            kind: FrameKind::ConnectionAck,
            id: None,
            payload: None,
        }
    }

    /// Creates a `ping` frame.
    #[inline]
    #[must_use]
    pub fn ping(payload: Option<Value>) -> Self {
        Self {
            kind: FrameKind::Ping,
            id: None,
            payload,
        }
    }

    /// Creates a `pong` frame.
    #[inline]
    #[must_use]
    pub fn pong(payload: Option<Value>) -> Self {
        Self {
            kind: FrameKind::Pong,
            id: None,
            payload,
        }
    }

    /// Creates a `subscribe` frame.
    #[inline]
    #[must_use]
    pub fn subscribe(id: SubscriptionId, payload: Value) -> Self {
        Self {
            kind: FrameKind::Subscribe,
            id: Some(id),
            payload: Some(payload),
        }
    }

    /// Creates a `next` frame.
    #[inline]
    #[must_use]
    pub fn next(id: SubscriptionId, payload: Value) -> Self {
        Self {
            kind: FrameKind::Next,
            id: Some(id),
            payload: Some(payload),
        }
    }

    /// Creates an `error` frame.
    #[inline]
    #[must_use]
    pub fn error(id: SubscriptionId, payload: Value) -> Self {
        Self {
            kind: FrameKind::Error,
            id: Some(id),
            payload: Some(payload),
        }
    }

    /// Creates a `complete` frame.
    #[inline]
    #[must_use]
    pub fn complete(id: SubscriptionId) -> Self {
        Self {
            kind: FrameKind::Complete,
            id: Some(id),
            payload: None,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Serializes a frame into its wire text.
///
/// # Errors
///
/// Returns [`Error::EncodingFailed`] if the payload cannot be serialized.
pub fn encode(frame: &Frame) -> Result<String> {
    serde_json::to_string(frame).map_err(|e| Error::encoding_failed(e.to_string()))
}

/// Parses wire text into a frame.
///
/// # Errors
///
/// Returns [`Error::MalformedFrame`] if the text is not a frame envelope,
/// the `type` is unknown, or a kind that needs an `id` arrives without one.
pub fn decode(text: &str) -> Result<Frame> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| Error::malformed_frame(e.to_string()))?;

    if frame.kind.requires_id() && frame.id.is_none() {
        return Err(Error::malformed_frame(format!(
            "`{}` frame without id",
            frame.kind
        )));
    }

    Ok(frame)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_complete_omits_payload() {
        let text = encode(&Frame::complete(SubscriptionId::new("1"))).unwrap();
        assert_eq!(text, r#"{"type":"complete","id":"1"}"#);
    }

    #[test]
    fn test_encode_connection_init() {
        let text = encode(&Frame::connection_init(json!({ "token": "abc" }))).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({ "type": "connection_init", "payload": { "token": "abc" } })
        );
    }

    #[test]
    fn test_decode_next() {
        let frame = decode(r#"{"type":"next","id":"a","payload":{"data":{"n":1}}}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Next);
        assert_eq!(frame.id, Some(SubscriptionId::new("a")));
        assert_eq!(frame.payload, Some(json!({ "data": { "n": 1 } })));
    }

    #[test]
    fn test_decode_ack_without_payload() {
        let frame = decode(r#"{"type":"connection_ack"}"#).unwrap();
        assert_eq!(frame, Frame::connection_ack());
    }

    #[test]
    fn test_decode_unknown_kind_is_malformed() {
        let err = decode(r#"{"type":"start","id":"1"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_decode_missing_id_is_malformed() {
        let err = decode(r#"{"type":"next","payload":{}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        assert!(matches!(
            decode("not json").unwrap_err(),
            Error::MalformedFrame { .. }
        ));
        assert!(matches!(
            decode("[1,2,3]").unwrap_err(),
            Error::MalformedFrame { .. }
        ));
    }

    proptest! {
        #[test]
        fn test_decode_never_panics(text in ".*") {
            let _ = decode(&text);
        }

        #[test]
        fn test_encoded_next_decodes_with_same_id(id in "[a-zA-Z0-9-]{1,36}", n in any::<i64>()) {
            let frame = Frame::next(SubscriptionId::new(id.clone()), json!({ "data": { "n": n } }));
            let decoded = decode(&encode(&frame).unwrap()).unwrap();
            prop_assert_eq!(decoded.id, Some(SubscriptionId::new(id)));
            prop_assert_eq!(decoded.kind, FrameKind::Next);
        }
    }
}
