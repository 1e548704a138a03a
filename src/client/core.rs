//! Client handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::transport::Transport;

use super::ErrorHandler;
use super::builder::ClientBuilder;
use super::engine::{ClientStatus, Command, ConnectionState, Engine};
use super::options::ClientOptions;
use super::registry::{SelectionDispatch, SubscriptionEntry};
use super::selection::Selection;
use super::stream::SubscriptionStream;

// ============================================================================
// Client
// ============================================================================

/// Handle to a subscription engine.
///
/// Cheap to clone; all clones drive the same connection. The engine task
/// stops when the last handle is dropped.
///
/// # Example
///
/// ```ignore
/// use gql_transport_ws::{Client, GraphQLRequest, WebSocketTransport};
/// use serde_json::{Value, json};
///
/// let client = Client::new(WebSocketTransport::new("wss://api.example.com/graphql")?)?;
/// client.start(&json!({ "authToken": "secret" })).await?;
///
/// let token = client.subscribe(
///     GraphQLRequest::<Value>::new("subscription { ticks }"),
///     |event| println!("{event:?}"),
/// );
///
/// // Later
/// token.cancel();
/// client.stop();
/// ```
#[derive(Clone)]
pub struct Client {
    /// Channel into the engine event loop.
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Client {
    /// Creates a client with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] outside a tokio runtime.
    pub fn new(transport: impl Transport) -> Result<Self> {
        Self::builder(transport).build()
    }

    /// Creates a builder for a client over `transport`.
    #[inline]
    #[must_use]
    pub fn builder(transport: impl Transport) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    /// Spawns the engine task. Must run inside a tokio runtime.
    pub(crate) fn spawn(
        transport: Arc<dyn Transport>,
        options: ClientOptions,
        on_error: Option<ErrorHandler>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Engine::new(transport, options, on_error).run(command_rx));

        Self { command_tx }
    }

    /// Opens the connection and sends `connection_init` with `params`.
    ///
    /// Returns once `connection_init` is written to the transport;
    /// subscriptions issued before the server acknowledges are queued. The
    /// engine keeps serving other handles while the transport connects.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if a connection exists or is being opened
    /// - [`Error::EncodeConnectionParamsFailed`] if `params` do not serialize
    /// - [`Error::ConnectionInitFailed`] if the transport cannot connect or send
    /// - [`Error::ConnectionClosed`] if [`stop`](Self::stop) runs before
    ///   `connection_init` is written, or the engine is gone
    pub async fn start<P>(&self, params: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params).map_err(|e| e.to_string());
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Start {
                params,
                reply: reply_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        reply_rx.await?
    }

    /// Subscribes with `selection`, reporting every event to `on_event`.
    ///
    /// Never blocks: the subscription is sent, queued until the
    /// connection is acknowledged, or rejected, and failures arrive through
    /// `on_event`. [`Error::StreamComplete`] is the last event of a
    /// subscription the server completed.
    ///
    /// `on_event` runs on the engine task and must not block.
    ///
    /// If an auto-connect fails, the subscription stays queued for the next
    /// `start` and `on_event` is not called; the failure goes to the
    /// [`on_error`](ClientBuilder::on_error) handler only.
    ///
    /// Cancelling the returned token stops delivery immediately and sends
    /// `complete` to the server.
    pub fn subscribe<S, F>(&self, selection: S, on_event: F) -> CancellationToken
    where
        S: Selection,
        F: FnMut(Result<S::Output>) + Send + 'static,
    {
        let id = SubscriptionId::generate();
        let token = self.cancel_token(id.clone());

        trace!(%id, "Subscribe requested");

        let entry = SubscriptionEntry::new(
            id,
            token.clone(),
            Box::new(SelectionDispatch::new(selection, on_event)),
        );

        if let Err(SendError(Command::Subscribe(mut entry))) =
            self.command_tx.send(Command::Subscribe(entry))
        {
            entry.dispatch.fail(Error::ConnectionClosed);
        }

        token
    }

    /// Subscribes with `selection` and returns the events as a stream.
    ///
    /// The stream ends when the subscription completes; dropping it
    /// cancels the subscription.
    pub fn subscribe_stream<S>(&self, selection: S) -> SubscriptionStream<S::Output>
    where
        S: Selection,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let token = self.subscribe(selection, move |event: Result<S::Output>| {
            if event.as_ref().err().is_some_and(Error::is_stream_complete) {
                return;
            }
            let _ = events_tx.send(event);
        });

        SubscriptionStream::new(events_rx, token)
    }

    /// Closes the connection and drops every open subscription.
    ///
    /// Subscription tokens are not cancelled. Subscriptions still waiting
    /// for `connection_ack` stay queued for the next `start`.
    pub fn stop(&self) {
        let _ = self.command_tx.send(Command::Stop);
    }

    /// Returns a snapshot of the engine state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine is gone.
    pub async fn status(&self) -> Result<ClientStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Status(reply_tx))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(reply_rx.await?)
    }

    /// Returns the connection state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine is gone.
    pub async fn state(&self) -> Result<ConnectionState> {
        Ok(self.status().await?.state)
    }

    /// Builds the token that tears down subscription `id`.
    fn cancel_token(&self, id: SubscriptionId) -> CancellationToken {
        // Weak, so outstanding tokens do not keep the engine alive.
        let command_tx = self.command_tx.downgrade();

        CancellationToken::new(move || {
            if let Some(command_tx) = command_tx.upgrade() {
                let _ = command_tx.send(Command::Cancel(id));
            }
        })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.command_tx.is_closed())
            .finish_non_exhaustive()
    }
}
