//! In-memory transport.
//!
//! [`ChannelTransport`] connects the client to a [`ChannelServer`] through
//! tokio channels. Each `connect` hands the server a [`ChannelPeer`] that
//! reads what the client sent and scripts what the client receives,
//! including transport failures.
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut server) = ChannelTransport::new();
//! let client = Client::new(transport)?;
//!
//! client.start(&json!({})).await?;
//! let mut peer = server.accept().await.unwrap();
//!
//! assert_eq!(peer.recv_frame().await.unwrap()?.kind, FrameKind::ConnectionInit);
//! peer.send_frame(&Frame::connection_ack())?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{self, Frame};

use super::{Transport, TransportLink};

// ============================================================================
// ChannelTransport
// ============================================================================

/// Client side of the in-memory transport.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    /// Delivers a peer to the server for every connection.
    peers: mpsc::UnboundedSender<ChannelPeer>,
}

impl ChannelTransport {
    /// Creates a connected transport/server pair.
    #[must_use]
    pub fn new() -> (Self, ChannelServer) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (Self { peers: peers_tx }, ChannelServer { peers: peers_rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> Result<TransportLink> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<String>>();

        self.peers
            .send(ChannelPeer {
                from_client: outbound_rx,
                to_client: inbound_tx,
            })
            .map_err(|_| Error::connection("Channel server is gone"))?;

        let sink = sink::unfold(outbound_tx, |tx, text: String| async move {
            trace!(%text, "Channel frame out");
            tx.send(text).map_err(|_| Error::ConnectionClosed)?;
            Ok::<_, Error>(tx)
        });

        let stream = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(TransportLink::new(Box::pin(sink), Box::pin(stream)))
    }
}

// ============================================================================
// ChannelServer
// ============================================================================

/// Server side of the in-memory transport.
#[derive(Debug)]
pub struct ChannelServer {
    peers: mpsc::UnboundedReceiver<ChannelPeer>,
}

impl ChannelServer {
    /// Waits for the next client connection.
    ///
    /// Returns `None` once every [`ChannelTransport`] is dropped.
    pub async fn accept(&mut self) -> Option<ChannelPeer> {
        self.peers.recv().await
    }

    /// Returns a pending connection without waiting.
    pub fn try_accept(&mut self) -> Option<ChannelPeer> {
        self.peers.try_recv().ok()
    }
}

// ============================================================================
// ChannelPeer
// ============================================================================

/// The server end of one in-memory connection.
///
/// Dropping the peer ends the client's inbound stream and makes further
/// client sends fail.
#[derive(Debug)]
pub struct ChannelPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String>>,
}

impl ChannelPeer {
    /// Waits for the next frame text sent by the client.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Waits for the next frame sent by the client and decodes it.
    pub async fn recv_frame(&mut self) -> Option<Result<Frame>> {
        self.recv_text().await.map(|text| protocol::decode(&text))
    }

    /// Returns a frame text the client already sent, without waiting.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Delivers raw text to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.to_client
            .send(Ok(text.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Encodes and delivers a frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.send_text(protocol::encode(frame)?)
    }

    /// Terminates the client's inbound stream with an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.to_client
            .send(Err(error))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Returns `true` once the client has dropped its end of the link.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
