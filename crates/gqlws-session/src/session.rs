//! Connection session: owns one connection's dispatcher, handshake timeout,
//! and teardown.
//!
//! The transport feeds inbound text messages into [`ConnectionSession::run`]
//! and drains the paired [`Outbound`] receiver into the socket. The session
//! never touches the socket itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use gqlws_core::{CloseStatus, FrameCodec, JsonCodec};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::{Flow, ProtocolDispatcher};
use crate::gateway::ExecutionGateway;
use crate::hook::InitHook;
use crate::info::SessionInfo;
use crate::metrics::{
    CLOSES_TOTAL, CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL,
};
use crate::registry::OperationRegistry;

/// Default handshake deadline.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default outbound queue depth.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Inbound frames queued while an earlier frame is still being handled.
const HELD_FRAMES_LIMIT: usize = 32;

/// Item written to the socket by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded frame.
    Text(String),
    /// Close the socket with this status. Always the last item.
    Close(CloseStatus),
}

/// Per-connection tunables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time allowed between accept and `connection_init`.
    pub init_timeout: Duration,
    /// Outbound queue depth. Senders wait when it is full.
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the connection with this status.
    Closed(CloseStatus),
    /// The client or transport went away first.
    TransportClosed,
}

impl SessionEnd {
    /// Close status sent by the server, if any.
    pub fn close_status(&self) -> Option<&CloseStatus> {
        match self {
            Self::Closed(status) => Some(status),
            Self::TransportClosed => None,
        }
    }
}

/// Builder for [`ConnectionSession`].
pub struct SessionBuilder {
    gateway: Arc<dyn ExecutionGateway>,
    init_hook: Option<Arc<dyn InitHook>>,
    codec: Arc<dyn FrameCodec>,
    config: SessionConfig,
    info: SessionInfo,
    shutdown: CancellationToken,
}

impl SessionBuilder {
    /// Start with the JSON codec, no init hook, and default config.
    pub fn new(gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self {
            gateway,
            init_hook: None,
            codec: Arc::new(JsonCodec),
            config: SessionConfig::default(),
            info: SessionInfo::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Authorize `connection_init` with `hook`.
    #[must_use]
    pub fn init_hook(mut self, hook: Arc<dyn InitHook>) -> Self {
        self.init_hook = Some(hook);
        self
    }

    /// Replace the frame codec.
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the session config.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Connection metadata from the upgrade request.
    #[must_use]
    pub fn info(mut self, info: SessionInfo) -> Self {
        self.info = info;
        self
    }

    /// Close with 1001 when `token` is cancelled.
    #[must_use]
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the session and the receiver the transport drains.
    pub fn build(self) -> (ConnectionSession, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let dispatcher = ProtocolDispatcher::new(
            Arc::new(self.info),
            self.init_hook,
            self.gateway,
            self.codec,
            tx.clone(),
        );
        let session = ConnectionSession {
            dispatcher,
            outbound: tx,
            init_timeout: self.config.init_timeout,
            shutdown: self.shutdown,
        };
        (session, rx)
    }
}

/// One client connection.
pub struct ConnectionSession {
    dispatcher: ProtocolDispatcher,
    outbound: mpsc::Sender<Outbound>,
    init_timeout: Duration,
    shutdown: CancellationToken,
}

impl ConnectionSession {
    /// Start building a session around `gateway`.
    pub fn builder(gateway: Arc<dyn ExecutionGateway>) -> SessionBuilder {
        SessionBuilder::new(gateway)
    }

    /// Connection metadata.
    pub fn info(&self) -> &Arc<SessionInfo> {
        self.dispatcher.info()
    }

    /// Live operations.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        self.dispatcher.registry()
    }

    /// Drive the connection until it closes.
    ///
    /// On return every operation has been cancelled and its task has
    /// finished. A server-initiated close is queued as the final
    /// [`Outbound::Close`].
    #[instrument(skip_all, fields(connection_id = %self.info().connection_id))]
    pub async fn run<S>(self, inbound: S) -> SessionEnd
    where
        S: Stream<Item = String> + Send + Unpin,
    {
        let started = Instant::now();
        info!(
            uri = %self.info().uri,
            subprotocol = ?self.info().subprotocol.map(|p| p.as_str()),
            "connection opened"
        );
        counter!(CONNECTIONS_TOTAL).increment(1);
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);

        let end = self.drive(inbound).await;

        let cancelled = self.dispatcher.shutdown_operations().await;
        if let SessionEnd::Closed(status) = &end {
            counter!(CLOSES_TOTAL, "code" => status.code.to_string()).increment(1);
            let _ = self.outbound.send(Outbound::Close(status.clone())).await;
        }

        info!(
            close = ?end.close_status().map(ToString::to_string),
            cancelled_operations = cancelled,
            "connection closed"
        );
        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        end
    }

    async fn drive<S>(&self, mut inbound: S) -> SessionEnd
    where
        S: Stream<Item = String> + Send + Unpin,
    {
        if self.info().subprotocol.is_some_and(|p| p.is_legacy()) {
            warn!("subscriptions-transport-ws is not supported, use graphql-transport-ws");
            return SessionEnd::Closed(CloseStatus::invalid_message());
        }

        let timeout = tokio::time::sleep(self.init_timeout);
        tokio::pin!(timeout);
        let mut watchdog = true;
        let mut held = VecDeque::new();

        loop {
            let text = match held.pop_front() {
                Some(text) => text,
                None => tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => {
                        debug!("server shutting down");
                        return SessionEnd::Closed(CloseStatus::going_away());
                    }
                    () = &mut timeout, if watchdog => {
                        watchdog = false;
                        if self.dispatcher.gate().try_expire() {
                            warn!(timeout_ms = self.init_timeout.as_millis(), "connection_init not received");
                            return SessionEnd::Closed(CloseStatus::init_timeout());
                        }
                        debug!("init timeout elapsed after handshake started");
                        continue;
                    }
                    message = inbound.next() => match message {
                        Some(text) => text,
                        None => {
                            debug!("inbound stream ended");
                            return SessionEnd::TransportClosed;
                        }
                    },
                },
            };

            match self.dispatch(&text, &mut inbound, &mut held).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close(status)) => return SessionEnd::Closed(status),
                Ok(Flow::Disconnected) => return SessionEnd::TransportClosed,
                Err(end) => return end,
            }
        }
    }

    /// Route one message while still watching shutdown and the transport.
    ///
    /// Frames that arrive while the dispatcher is busy (an init hook is
    /// running) are queued in `held`, in order, up to [`HELD_FRAMES_LIMIT`].
    /// Past the limit the inbound stream is not polled until the message
    /// finishes.
    async fn dispatch<S>(
        &self,
        text: &str,
        inbound: &mut S,
        held: &mut VecDeque<String>,
    ) -> Result<Flow, SessionEnd>
    where
        S: Stream<Item = String> + Send + Unpin,
    {
        let handled = self.dispatcher.handle_message(text);
        tokio::pin!(handled);

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("server shutting down during dispatch");
                    return Err(SessionEnd::Closed(CloseStatus::going_away()));
                }
                flow = &mut handled => return Ok(flow),
                message = inbound.next(), if held.len() < HELD_FRAMES_LIMIT => match message {
                    Some(text) => held.push_back(text),
                    None => {
                        debug!("inbound stream ended during dispatch");
                        return Err(SessionEnd::TransportClosed);
                    }
                },
            }
        }
    }
}
