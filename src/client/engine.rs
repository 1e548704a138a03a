//! Protocol engine event loop.
//!
//! The engine is a tokio task that owns all connection state: the
//! [`ConnectionState`], the queue of subscriptions waiting for
//! `connection_ack` and the registry of open subscriptions.
//! [`Client`](super::Client) handles talk to it over a command channel,
//! so every mutation happens on this one task, in order.
//!
//! The loop itself never waits on the transport. `connect` runs in a
//! spawned task and hands the link back when it is up; outbound frames go
//! through a writer task that owns the sink and reports back when
//! `connection_init` was written or a send failed.
//!
//! # Event Loop
//!
//! The loop selects over:
//!
//! - Commands from `Client` handles (start, subscribe, cancel, stop, status)
//! - The link from an in-flight `connect`
//! - Reports from the writer task
//! - Inbound frames from the transport
//! - The `connection_ack` deadline, when one is armed
//!
//! # State Machine
//!
//! | State | link ready | `connection_ack` | `subscribe` | `stop` |
//! |-------|------------|------------------|-------------|--------|
//! | `NotStarted` | - | ignored | queue + auto-connect, or reject | no-op |
//! | `Connecting` | → `AwaitingAck`, send init | ignored | queue | abort connect |
//! | `AwaitingAck` | - | → `Ready`, drain queue | queue | → `NotStarted` |
//! | `Ready` | - | ignored | send | → `NotStarted` |

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::future;
use std::mem;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{self, Frame, FrameKind};
use crate::transport::{FrameSink, FrameStream, Transport, TransportLink};

use super::ErrorHandler;
use super::options::ClientOptions;
use super::registry::{Registry, Routed, SubscriptionEntry};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport exists.
    #[default]
    NotStarted,
    /// Transport connect in flight.
    Connecting,
    /// Transport open, `connection_init` sent, no `connection_ack` yet.
    AwaitingAck,
    /// Acknowledged; subscriptions are sent immediately.
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not_started",
            Self::Connecting => "connecting",
            Self::AwaitingAck => "awaiting_ack",
            Self::Ready => "ready",
        })
    }
}

// ============================================================================
// ClientStatus
// ============================================================================

/// Snapshot of the engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Open subscriptions.
    pub subscriptions: usize,
    /// Subscriptions waiting for `connection_ack`.
    pub pending: usize,
}

// ============================================================================
// Command
// ============================================================================

/// Reply channel of a `start` call.
type StartReply = oneshot::Sender<Result<()>>;

/// Requests from `Client` handles to the event loop.
pub(crate) enum Command {
    /// Open the connection.
    Start {
        /// Connection params, or the message of their serialization error.
        params: std::result::Result<Value, String>,
        reply: StartReply,
    },
    /// Open or queue a subscription.
    Subscribe(SubscriptionEntry),
    /// Tear down one subscription.
    Cancel(SubscriptionId),
    /// Close the connection.
    Stop,
    /// Report a status snapshot.
    Status(oneshot::Sender<ClientStatus>),
}

// ============================================================================
// Link Tasks
// ============================================================================

/// An in-flight `Transport::connect`.
struct Connecting {
    task: JoinHandle<Result<TransportLink>>,
    /// Encoded `connection_init`, sent once the link is up.
    init: String,
}

/// What an outbound frame is for, so a failed write can be attributed.
enum Purpose {
    Init,
    Subscribe(SubscriptionId),
    Control,
}

struct Outbound {
    text: String,
    purpose: Purpose,
}

/// Reports from the writer task.
enum Written {
    /// `connection_init` reached the transport.
    InitSent,
    /// The sink failed; the writer has stopped.
    Failed { purpose: Purpose, error: Error },
}

/// Engine side of the writer task.
struct Writer {
    outbound: mpsc::UnboundedSender<Outbound>,
    written: mpsc::UnboundedReceiver<Written>,
}

/// Writes frames in order until the engine drops its sender, then closes
/// the sink.
async fn write_loop(
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    written: mpsc::UnboundedSender<Written>,
) {
    while let Some(Outbound { text, purpose }) = outbound.recv().await {
        trace!(%text, "Frame out");

        if let Err(error) = sink.send(text).await {
            let _ = written.send(Written::Failed { purpose, error });
            return;
        }

        if matches!(purpose, Purpose::Init) {
            let _ = written.send(Written::InitSent);
        }
    }

    let _ = sink.close().await;
    trace!("Writer closed");
}

// ============================================================================
// Engine
// ============================================================================

/// State owned by the event loop task.
pub(crate) struct Engine {
    /// Opens links on `start`.
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    /// Sink for connection-wide failures.
    on_error: Option<ErrorHandler>,

    state: ConnectionState,
    /// Set while `Connecting`.
    connecting: Option<Connecting>,
    /// Caller of the current `start`, answered once `connection_init` is written.
    start_reply: Option<StartReply>,
    /// Outbound half of the current link.
    writer: Option<Writer>,
    /// Inbound half of the current link.
    inbound: Option<FrameStream>,
    /// Armed while waiting for `connection_ack`.
    ack_deadline: Option<Instant>,

    /// Subscriptions issued before `Ready`, in call order.
    pending: VecDeque<SubscriptionEntry>,
    registry: Registry,
    /// Snapshot of the params of the last `start`, reused by auto-connect.
    last_params: Option<Value>,
}

impl Engine {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: ClientOptions,
        on_error: Option<ErrorHandler>,
    ) -> Self {
        Self {
            transport,
            options,
            on_error,
            state: ConnectionState::NotStarted,
            connecting: None,
            start_reply: None,
            writer: None,
            inbound: None,
            ack_deadline: None,
            pending: VecDeque::new(),
            registry: Registry::default(),
            last_params: None,
        }
    }

    /// Runs until every `Client` handle is dropped.
    pub(crate) async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        debug!("Event loop started");

        loop {
            tokio::select! {
                // Commands from Client handles
                command = command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }

                // Link from an in-flight connect
                link = next_link(&mut self.connecting) => {
                    self.handle_connected(link);
                }

                // Writer task reports
                written = next_written(&mut self.writer) => {
                    self.handle_written(written);
                }

                // Inbound frames from the server
                inbound = next_inbound(&mut self.inbound) => {
                    self.handle_inbound(inbound);
                }

                // connection_ack deadline
                () = ack_deadline(self.ack_deadline) => {
                    self.handle_ack_timeout();
                }
            }
        }

        self.stop();

        debug!("Event loop terminated");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { params, reply } => self.start(params, Some(reply)),
            Command::Subscribe(entry) => self.subscribe(entry),
            Command::Cancel(id) => self.cancel(&id),
            Command::Stop => self.stop(),
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Starts connecting. `reply` is `None` for auto-connect.
    fn start(&mut self, params: std::result::Result<Value, String>, reply: Option<StartReply>) {
        match self.prepare_start(params) {
            Ok(init) => self.connect(init, reply),
            Err(e) => self.finish_start(reply, Err(e)),
        }
    }

    /// Checks the state and encodes `connection_init`.
    fn prepare_start(&mut self, params: std::result::Result<Value, String>) -> Result<String> {
        if self.state != ConnectionState::NotStarted {
            debug!(state = %self.state, "Start rejected");
            return Err(Error::AlreadyStarted);
        }

        let params = params.map_err(Error::encode_connection_params_failed)?;
        let init = protocol::encode(&Frame::connection_init(params.clone()))
            .map_err(|e| Error::encode_connection_params_failed(e.to_string()))?;
        self.last_params = Some(params);

        Ok(init)
    }

    fn connect(&mut self, init: String, reply: Option<StartReply>) {
        let transport = Arc::clone(&self.transport);
        let task = tokio::spawn(async move { transport.connect().await });

        self.connecting = Some(Connecting { task, init });
        self.start_reply = reply;
        self.set_state(ConnectionState::Connecting);
    }

    /// Answers the `start` caller, or reports an auto-connect failure.
    fn finish_start(&self, reply: Option<StartReply>, result: Result<()>) {
        match (reply, result) {
            (Some(reply), result) => {
                let _ = reply.send(result);
            }
            (None, Err(e)) => {
                warn!(error = %e, "Auto-connect failed");
                self.report(e);
            }
            (None, Ok(())) => {}
        }
    }

    /// Sends, queues or rejects a subscription depending on the state.
    fn subscribe(&mut self, mut entry: SubscriptionEntry) {
        if entry.token.is_cancelled() {
            trace!(id = %entry.id, "Subscription cancelled before it was issued");
            return;
        }

        match self.state {
            ConnectionState::NotStarted if !self.options.auto_connect => {
                debug!(id = %entry.id, "Subscribe rejected, not started");
                entry.dispatch.fail(Error::NotStartedAndNoAutoConnect);
            }
            ConnectionState::NotStarted => {
                debug!(id = %entry.id, "Subscription queued, auto-connecting");
                self.pending.push_back(entry);

                let params = self
                    .last_params
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                self.start(Ok(params), None);
            }
            ConnectionState::Connecting | ConnectionState::AwaitingAck => {
                debug!(id = %entry.id, "Subscription queued");
                self.pending.push_back(entry);
            }
            ConnectionState::Ready => self.open(entry),
        }
    }

    /// Sends `subscribe` and registers the entry.
    fn open(&mut self, mut entry: SubscriptionEntry) {
        let payload = match entry.dispatch.payload() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(id = %entry.id, error = %e, "Subscription payload failed");
                entry.dispatch.fail(e);
                return;
            }
        };

        let frame = Frame::subscribe(entry.id.clone(), payload);
        if let Err(e) = self.send_frame(&frame, Purpose::Subscribe(entry.id.clone())) {
            warn!(id = %entry.id, error = %e, "Failed to send subscribe");
            entry.dispatch.fail(Error::subscribe_failed(e.to_string()));
            return;
        }

        debug!(id = %entry.id, "Subscription opened");
        self.registry.insert(entry);
    }

    /// Drops a queued subscription, or completes an open one.
    fn cancel(&mut self, id: &SubscriptionId) {
        let queued = self.pending.len();
        self.pending.retain(|entry| &entry.id != id);
        if self.pending.len() != queued {
            debug!(%id, "Queued subscription cancelled");
            return;
        }

        if self.registry.remove(id).is_none() {
            trace!(%id, "Cancel for closed subscription");
            return;
        }

        // Best effort: the subscription is gone locally either way.
        if let Err(e) = self.send_frame(&Frame::complete(id.clone()), Purpose::Control) {
            debug!(%id, error = %e, "Failed to send complete");
        }

        debug!(%id, "Subscription cancelled");
    }

    /// Drops the link and open subscriptions. The queue is kept.
    fn stop(&mut self) {
        self.ack_deadline = None;
        self.inbound = None;

        // The writer closes the sink once its sender is gone.
        let writer = self.writer.take();
        let connecting = self.connecting.take();
        if let Some(connecting) = &connecting {
            connecting.task.abort();
        }

        let dropped = self.registry.clear();

        if let Some(reply) = self.start_reply.take() {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }

        if self.state == ConnectionState::NotStarted && writer.is_none() && connecting.is_none() {
            return;
        }

        self.set_state(ConnectionState::NotStarted);
        info!(dropped, "Connection stopped");
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.state,
            subscriptions: self.registry.len(),
            pending: self.pending.len(),
        }
    }

    // ========================================================================
    // Link
    // ========================================================================

    /// Installs a fresh link and queues `connection_init`.
    fn handle_connected(&mut self, link: Result<TransportLink>) {
        let Some(Connecting { init, .. }) = self.connecting.take() else {
            return;
        };

        let link = match link {
            Ok(link) => link,
            Err(e) => {
                warn!(error = %e, "Transport connect failed");
                self.set_state(ConnectionState::NotStarted);
                let reply = self.start_reply.take();
                self.finish_start(reply, Err(Error::connection_init_failed(e.to_string())));
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(link.sink, outbound_rx, written_tx));

        self.writer = Some(Writer {
            outbound: outbound_tx,
            written: written_rx,
        });
        self.inbound = Some(link.stream);
        self.set_state(ConnectionState::AwaitingAck);

        if let Err(e) = self.send_text(init, Purpose::Init) {
            self.fail_init(e);
            return;
        }

        // A deadline past the clock's range never fires.
        self.ack_deadline = self
            .options
            .connection_ack_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
    }

    fn handle_written(&mut self, written: Option<Written>) {
        match written {
            Some(Written::InitSent) => {
                info!("connection_init sent");
                let reply = self.start_reply.take();
                self.finish_start(reply, Ok(()));
            }
            Some(Written::Failed {
                purpose: Purpose::Init,
                error,
            }) => self.fail_init(error),
            Some(Written::Failed {
                purpose: Purpose::Subscribe(id),
                error,
            }) => {
                warn!(%id, error = %error, "Failed to send subscribe");
                if let Some(mut entry) = self.registry.remove(&id)
                    && !entry.token.is_cancelled()
                {
                    entry.dispatch.fail(Error::subscribe_failed(error.to_string()));
                }
                self.fail_connection(error);
            }
            Some(Written::Failed {
                purpose: Purpose::Control,
                error,
            }) => self.fail_connection(error),
            None => self.fail_connection(Error::ConnectionClosed),
        }
    }

    /// Stops after `connection_init` could not be sent.
    fn fail_init(&mut self, error: Error) {
        warn!(error = %error, "Failed to send connection_init");
        let reply = self.start_reply.take();
        self.stop();
        self.finish_start(reply, Err(Error::connection_init_failed(error.to_string())));
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    fn handle_inbound(&mut self, inbound: Option<Result<String>>) {
        match inbound {
            Some(Ok(text)) => {
                trace!(%text, "Frame in");
                match protocol::decode(&text) {
                    Ok(frame) => self.route(frame),
                    Err(e) => self.fail_connection(e),
                }
            }
            Some(Err(e)) => self.fail_connection(e),
            None => {
                debug!("Inbound stream ended");
                self.fail_connection(Error::ConnectionClosed);
            }
        }
    }

    fn route(&mut self, frame: Frame) {
        match frame.kind {
            FrameKind::ConnectionAck => self.acknowledge(),

            FrameKind::Next | FrameKind::Error | FrameKind::Complete => {
                let Some(id) = frame.id.clone() else {
                    return;
                };

                match self.registry.route(&id, frame) {
                    Routed::Delivered => trace!(%id, "Frame delivered"),
                    Routed::Finished => debug!(%id, "Subscription finished by server"),
                    Routed::Cancelled => trace!(%id, "Frame for cancelled subscription"),
                    Routed::Unknown => debug!(%id, "Frame for unknown subscription"),
                }
            }

            FrameKind::Ping => {
                if let Err(e) = self.send_frame(&Frame::pong(frame.payload), Purpose::Control) {
                    warn!(error = %e, "Failed to send pong");
                }
            }

            FrameKind::Pong => trace!("Pong received"),

            FrameKind::Subscribe | FrameKind::ConnectionInit => {
                warn!(kind = %frame.kind, "Ignoring client-only frame from server");
            }
        }
    }

    /// Moves to `Ready` and sends every queued subscription in order.
    fn acknowledge(&mut self) {
        if self.state != ConnectionState::AwaitingAck {
            warn!(state = %self.state, "Ignoring unexpected connection_ack");
            return;
        }

        self.ack_deadline = None;
        self.set_state(ConnectionState::Ready);

        let pending = mem::take(&mut self.pending);
        info!(pending = pending.len(), "connection_ack received");

        for entry in pending {
            if entry.token.is_cancelled() {
                continue;
            }
            self.open(entry);
        }
    }

    fn handle_ack_timeout(&mut self) {
        let timeout = self.options.connection_ack_timeout.unwrap_or_default();
        self.fail_connection(Error::ack_timeout(timeout));
    }

    /// Stops after a connection-wide failure and reports it.
    fn fail_connection(&mut self, error: Error) {
        warn!(error = %error, "Connection lost");
        self.stop();
        self.report(error);
    }

    fn report(&self, error: Error) {
        match &self.on_error {
            Some(handler) => handler(error),
            None => warn!(error = %error, "Unhandled connection error"),
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    fn send_frame(&self, frame: &Frame, purpose: Purpose) -> Result<()> {
        let text = protocol::encode(frame)?;
        self.send_text(text, purpose)
    }

    /// Hands a frame to the writer task. Fails only if no link exists.
    fn send_text(&self, text: String, purpose: Purpose) -> Result<()> {
        let writer = self.writer.as_ref().ok_or(Error::ConnectionClosed)?;
        writer
            .outbound
            .send(Outbound { text, purpose })
            .map_err(|_| Error::ConnectionClosed)
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Connection state changed");
            self.state = state;
        }
    }
}

// ============================================================================
// Select Helpers
// ============================================================================

/// Result of the in-flight connect; pends forever while none runs.
async fn next_link(connecting: &mut Option<Connecting>) -> Result<TransportLink> {
    match connecting {
        Some(connecting) => match (&mut connecting.task).await {
            Ok(link) => link,
            Err(e) => Err(Error::connection(format!("Connect task failed: {e}"))),
        },
        None => future::pending().await,
    }
}

/// Next writer report; pends forever while no link exists.
async fn next_written(writer: &mut Option<Writer>) -> Option<Written> {
    match writer {
        Some(writer) => writer.written.recv().await,
        None => future::pending().await,
    }
}

/// Next inbound item; pends forever while no link exists.
async fn next_inbound(inbound: &mut Option<FrameStream>) -> Option<Result<String>> {
    match inbound {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

/// Fires at the deadline; pends forever when none is armed.
async fn ack_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::transport::ChannelTransport;

    /// Transport whose `connect` never finishes.
    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn connect(&self) -> Result<TransportLink> {
            future::pending().await
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::NotStarted.to_string(), "not_started");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::AwaitingAck.to_string(), "awaiting_ack");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(ConnectionState::default(), ConnectionState::NotStarted);
    }

    #[tokio::test]
    async fn test_stop_when_not_started_is_noop() {
        let (transport, _server) = ChannelTransport::new();
        let mut engine = Engine::new(Arc::new(transport), ClientOptions::default(), None);

        engine.stop();

        assert_eq!(engine.status().state, ConnectionState::NotStarted);
    }

    #[tokio::test]
    async fn test_start_replies_after_init_written() {
        let (transport, mut server) = ChannelTransport::new();
        let options = ClientOptions::new().with_connection_ack_timeout(Duration::from_secs(5));
        let mut engine = Engine::new(Arc::new(transport), options, None);
        let (reply_tx, mut reply_rx) = oneshot::channel();

        engine.start(Ok(json!({})), Some(reply_tx));
        assert_eq!(engine.status().state, ConnectionState::Connecting);
        assert!(engine.ack_deadline.is_none());

        let link = next_link(&mut engine.connecting).await;
        engine.handle_connected(link);
        let _peer = server.accept().await.unwrap();

        assert!(engine.ack_deadline.is_some());
        assert_eq!(engine.status().state, ConnectionState::AwaitingAck);
        assert!(reply_rx.try_recv().is_err());

        let written = next_written(&mut engine.writer).await;
        engine.handle_written(written);
        assert!(reply_rx.try_recv().unwrap().is_ok());

        engine.acknowledge();
        assert!(engine.ack_deadline.is_none());
        assert_eq!(engine.status().state, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_huge_ack_timeout_never_fires() {
        let (transport, mut server) = ChannelTransport::new();
        let options = ClientOptions::new().with_connection_ack_timeout(Duration::MAX);
        let mut engine = Engine::new(Arc::new(transport), options, None);

        engine.start(Ok(json!({})), None);
        let link = next_link(&mut engine.connecting).await;
        engine.handle_connected(link);
        let _peer = server.accept().await.unwrap();

        assert!(engine.ack_deadline.is_none());
        assert_eq!(engine.status().state, ConnectionState::AwaitingAck);
    }

    #[tokio::test]
    async fn test_stop_aborts_connect() {
        let mut engine = Engine::new(Arc::new(StalledTransport), ClientOptions::default(), None);
        let (reply_tx, reply_rx) = oneshot::channel();

        engine.start(Ok(json!({})), Some(reply_tx));
        assert_eq!(engine.status().state, ConnectionState::Connecting);

        engine.stop();

        assert!(engine.connecting.is_none());
        assert_eq!(engine.status().state, ConnectionState::NotStarted);
        assert!(matches!(reply_rx.await.unwrap(), Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_start_with_unencodable_params() {
        let (transport, _server) = ChannelTransport::new();
        let mut engine = Engine::new(Arc::new(transport), ClientOptions::default(), None);
        let (reply_tx, reply_rx) = oneshot::channel();

        engine.start(Err("key must be a string".into()), Some(reply_tx));

        let err = reply_rx.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::EncodeConnectionParamsFailed { .. }));
        assert_eq!(engine.status().state, ConnectionState::NotStarted);
        assert!(engine.last_params.is_none());
    }
}
