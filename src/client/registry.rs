//! Subscription registry.
//!
//! Maps each open subscription id to the entry that decodes its frames
//! and reports events to the subscriber. Only the engine touches it.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{ExecutionResult, Frame, FrameKind, GraphQLError};

use super::selection::Selection;

// ============================================================================
// Dispatch
// ============================================================================

/// What happens to an entry after a frame was dispatched to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// The subscription stays open.
    Keep,
    /// The subscription ended; drop the entry.
    Remove,
}

/// Type-erased subscriber: builds the request and consumes frames.
pub(crate) trait Dispatch: Send {
    /// Builds the `subscribe` payload.
    fn payload(&self) -> Result<Value>;

    /// Handles one `next`, `error` or `complete` frame.
    fn dispatch(&mut self, frame: Frame) -> Disposition;

    /// Reports a failure that happened before the subscription opened.
    fn fail(&mut self, error: Error);
}

/// [`Dispatch`] over a [`Selection`] and an event callback.
pub(crate) struct SelectionDispatch<S, F> {
    selection: S,
    on_event: F,
}

impl<S, F> SelectionDispatch<S, F> {
    pub(crate) fn new(selection: S, on_event: F) -> Self {
        Self {
            selection,
            on_event,
        }
    }
}

impl<S, F> SelectionDispatch<S, F>
where
    S: Selection,
{
    /// Decodes a `next` payload into the selection output.
    fn decode_next(&self, payload: Option<Value>) -> Result<S::Output> {
        let result: ExecutionResult = serde_json::from_value(payload.unwrap_or(Value::Null))
            .map_err(|e| Error::decode_selection_failed(e.to_string()))?;

        let data = result.into_data().map_err(Error::RemoteErrors)?;

        self.selection
            .decode(data)
            .map_err(|e| Error::decode_selection_failed(e.to_string()))
    }
}

/// Decodes an `error` payload into the error to report.
fn decode_errors(payload: Option<Value>) -> Error {
    match serde_json::from_value::<Vec<GraphQLError>>(payload.unwrap_or(Value::Null)) {
        Ok(errors) => Error::RemoteErrors(errors),
        Err(e) => Error::decode_errors_failed(e.to_string()),
    }
}

impl<S, F> Dispatch for SelectionDispatch<S, F>
where
    S: Selection,
    F: FnMut(Result<S::Output>) + Send + 'static,
{
    fn payload(&self) -> Result<Value> {
        self.selection
            .payload()
            .and_then(serde_json::to_value)
            .map_err(|e| Error::encode_selection_failed(e.to_string()))
    }

    fn dispatch(&mut self, frame: Frame) -> Disposition {
        match frame.kind {
            FrameKind::Next => {
                let event = self.decode_next(frame.payload);
                (self.on_event)(event);
                Disposition::Keep
            }
            FrameKind::Error => {
                (self.on_event)(Err(decode_errors(frame.payload)));
                Disposition::Remove
            }
            FrameKind::Complete => {
                (self.on_event)(Err(Error::StreamComplete));
                Disposition::Remove
            }
            _ => Disposition::Keep,
        }
    }

    fn fail(&mut self, error: Error) {
        (self.on_event)(Err(error));
    }
}

// ============================================================================
// SubscriptionEntry
// ============================================================================

/// One subscription, queued or open.
pub(crate) struct SubscriptionEntry {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Token returned to the caller; checked before every dispatch.
    pub token: CancellationToken,
    /// Subscriber.
    pub dispatch: Box<dyn Dispatch>,
}

impl SubscriptionEntry {
    pub(crate) fn new(
        id: SubscriptionId,
        token: CancellationToken,
        dispatch: Box<dyn Dispatch>,
    ) -> Self {
        Self {
            id,
            token,
            dispatch,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Outcome of routing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Delivered; the subscription stays open.
    Delivered,
    /// Delivered; the subscription ended and was removed.
    Finished,
    /// The caller already cancelled; dropped.
    Cancelled,
    /// No subscription with this id.
    Unknown,
}

/// Open subscriptions by id.
#[derive(Default)]
pub(crate) struct Registry {
    entries: FxHashMap<SubscriptionId, SubscriptionEntry>,
}

impl Registry {
    /// Registers an open subscription.
    pub(crate) fn insert(&mut self, entry: SubscriptionEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Removes a subscription.
    pub(crate) fn remove(&mut self, id: &SubscriptionId) -> Option<SubscriptionEntry> {
        self.entries.remove(id)
    }

    /// Routes a frame to the subscription it belongs to.
    pub(crate) fn route(&mut self, id: &SubscriptionId, frame: Frame) -> Routed {
        let Some(entry) = self.entries.get_mut(id) else {
            return Routed::Unknown;
        };

        // The entry itself is removed by the cancel command, which also
        // sends `complete` to the server.
        if entry.token.is_cancelled() {
            return Routed::Cancelled;
        }

        match entry.dispatch.dispatch(frame) {
            Disposition::Keep => Routed::Delivered,
            Disposition::Remove => {
                self.entries.remove(id);
                Routed::Finished
            }
        }
    }

    /// Drops every subscription without notifying it.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &SubscriptionId) -> bool {
        self.entries.contains_key(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
