//! WebSocket transport over `tokio-tungstenite`.
//!
//! Opens a client WebSocket requesting the `graphql-transport-ws`
//! subprotocol and exposes text messages as frame texts. Binary, ping and
//! pong messages are handled by tungstenite and never reach the engine.

// ============================================================================
// Imports
// ============================================================================

use std::future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{CONTENT_TYPE, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::GRAPHQL_TRANSPORT_WS_PROTOCOL;

use super::{Transport, TransportLink};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Connects to a GraphQL server over WebSocket.
///
/// # Example
///
/// ```ignore
/// use gql_transport_ws::{Client, WebSocketTransport};
///
/// let transport = WebSocketTransport::new("wss://api.example.com/graphql")?;
/// let client = Client::new(transport)?;
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    /// Server endpoint.
    url: Url,
    /// Handshake timeout.
    connect_timeout: Duration,
}

impl WebSocketTransport {
    /// Creates a transport for the given `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or does not use
    /// a WebSocket scheme.
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| Error::config(format!("Invalid WebSocket URL: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported URL scheme `{}` (expected ws or wss)",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Returns the server endpoint.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<TransportLink> {
        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(GRAPHQL_TRANSPORT_WS_PROTOCOL),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(url = %self.url, "Opening WebSocket");

        let (ws_stream, _response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| Error::connection_timeout(self.connect_timeout))?
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        info!(url = %self.url, "WebSocket connection established");

        let (ws_write, ws_read) = ws_stream.split();

        let sink = ws_write
            .with(|text: String| future::ready(Ok::<_, WsError>(Message::Text(text.into()))))
            .sink_map_err(Error::from);

        let stream = ws_read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by remote");
                    None
                }
                Err(e) => Some(Err(Error::from(e))),
                // Ignore Binary, Ping, Pong
                Ok(_) => None,
            })
        });

        Ok(TransportLink::new(Box::pin(sink), stream.boxed()))
    }
}

// ============================================================================
// Tests
// ============================================================================
