//! Stream adapter for subscriptions.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::cancel::{CancellationToken, DropGuard};
use crate::error::Result;

// ============================================================================
// SubscriptionStream
// ============================================================================

/// A subscription consumed as a [`Stream`].
///
/// Yields one item per `next` frame plus any error the subscription
/// reports. The stream ends when the server completes the subscription,
/// after an `error` frame, or when the connection stops. Dropping the
/// stream cancels the subscription.
pub struct SubscriptionStream<T> {
    events: mpsc::UnboundedReceiver<Result<T>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl<T> SubscriptionStream<T> {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<Result<T>>, token: CancellationToken) -> Self {
        Self {
            events,
            _guard: token.clone().drop_guard(),
            token,
        }
    }

    /// Cancels the subscription; the stream ends after buffered items.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.events.close();
    }

    /// Returns the subscription's cancellation token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<T> Stream for SubscriptionStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl<T> fmt::Debug for SubscriptionStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
