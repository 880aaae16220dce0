//! Protocol Dispatcher: routes decoded inbound frames by message type.
//!
//! | inbound            | state                   | effect                                   |
//! |--------------------|-------------------------|------------------------------------------|
//! | `connection_init`  | pending                 | run init hook, send `connection_ack`     |
//! | `connection_init`  | any other               | close 4429                               |
//! | `subscribe`        | not acknowledged        | close 4401                               |
//! | `subscribe`        | acknowledged            | register id and spawn the operation      |
//! | `subscribe`        | id already live         | close 4409                               |
//! | `complete`         | any                     | cancel the operation if it is live       |
//! | anything else      | any                     | close 4400                               |

use std::sync::Arc;

use gqlws_core::{CloseStatus, Frame, FrameCodec, MessageType};
use metrics::counter;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::adapter::{OperationContext, run_operation};
use crate::gate::InitGate;
use crate::gateway::{ExecutionGateway, OperationInput};
use crate::hook::InitHook;
use crate::info::SessionInfo;
use crate::metrics::OPERATIONS_TOTAL;
use crate::registry::{OperationHandle, OperationRegistry};
use crate::session::Outbound;

/// What the session loop does after one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Close the connection with this status.
    Close(CloseStatus),
    /// The outbound side is gone; stop without a close frame.
    Disconnected,
}

/// Per-connection frame router.
pub struct ProtocolDispatcher {
    info: Arc<SessionInfo>,
    gate: InitGate,
    registry: Arc<OperationRegistry>,
    init_hook: Option<Arc<dyn InitHook>>,
    gateway: Arc<dyn ExecutionGateway>,
    codec: Arc<dyn FrameCodec>,
    outbound: mpsc::Sender<Outbound>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl ProtocolDispatcher {
    pub(crate) fn new(
        info: Arc<SessionInfo>,
        init_hook: Option<Arc<dyn InitHook>>,
        gateway: Arc<dyn ExecutionGateway>,
        codec: Arc<dyn FrameCodec>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            info,
            gate: InitGate::new(),
            registry: Arc::new(OperationRegistry::new()),
            init_hook,
            gateway,
            codec,
            outbound,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Connection metadata.
    pub fn info(&self) -> &Arc<SessionInfo> {
        &self.info
    }

    /// Handshake latch.
    pub fn gate(&self) -> &InitGate {
        &self.gate
    }

    /// Live operations.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Cancel every operation, registered or not, and wait for their
    /// tasks to finish. Returns how many were still registered.
    pub(crate) async fn shutdown_operations(&self) -> usize {
        let registered = self.registry.drain_all();
        self.cancel.cancel();
        let _ = self.tasks.close();
        self.tasks.wait().await;
        registered
    }

    /// Decode one text message and route it.
    pub async fn handle_message(&self, text: &str) -> Flow {
        match self.codec.decode(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(e) => {
                warn!(error = %e, "invalid message");
                Flow::Close(CloseStatus::invalid_message())
            }
        }
    }

    /// Route one decoded frame.
    pub async fn handle_frame(&self, frame: Frame) -> Flow {
        match frame.message_type {
            MessageType::ConnectionInit => self.on_init(frame.payload).await,
            MessageType::Subscribe => self.on_subscribe(frame.id, frame.payload),
            MessageType::Complete => {
                self.on_complete(frame.id.as_deref());
                Flow::Continue
            }
            other => {
                warn!(message_type = %other, "unexpected message type from client");
                Flow::Close(CloseStatus::invalid_message())
            }
        }
    }

    async fn on_init(&self, payload: Option<Value>) -> Flow {
        if !self.gate.try_begin() {
            warn!(state = ?self.gate.state(), "duplicate connection_init");
            return Flow::Close(CloseStatus::too_many_init_requests());
        }

        let payload = match payload {
            None => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                warn!(payload = %other, "connection_init payload is not an object");
                return Flow::Close(CloseStatus::invalid_message());
            }
        };

        let ack = match &self.init_hook {
            Some(hook) => match hook.handle_init(payload.as_ref(), &self.info).await {
                Ok(ack) => ack,
                Err(e) => {
                    warn!(error = %e, "connection init rejected");
                    return Flow::Close(e.close_status());
                }
            },
            None => Map::new(),
        };

        self.info.set_init_payload(payload.unwrap_or_default());
        let text = match self.codec.encode(&Frame::connection_ack(ack)) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "connection_ack encoding failed");
                return Flow::Close(CloseStatus::unauthorized());
            }
        };
        if self.outbound.send(Outbound::Text(text)).await.is_err() {
            return Flow::Disconnected;
        }
        let _ = self.gate.acknowledge();
        info!("connection acknowledged");
        Flow::Continue
    }

    fn on_subscribe(&self, id: Option<String>, payload: Option<Value>) -> Flow {
        if !self.gate.is_acknowledged() {
            warn!(state = ?self.gate.state(), "subscribe before connection_ack");
            return Flow::Close(CloseStatus::unauthorized());
        }
        let Some(id) = id else {
            warn!("subscribe without id");
            return Flow::Close(CloseStatus::invalid_message());
        };
        let Some(Value::Object(payload)) = payload else {
            warn!(operation_id = %id, "subscribe payload is not an object");
            return Flow::Close(CloseStatus::invalid_message());
        };
        let input = match OperationInput::from_subscribe(&id, &payload, &self.info) {
            Ok(input) => input,
            Err(e) => {
                warn!(operation_id = %id, error = %e, "invalid subscribe payload");
                return Flow::Close(CloseStatus::invalid_message());
            }
        };

        let handle = OperationHandle::child_of(&self.cancel);
        if let Err(e) = self.registry.register(&id, handle.clone()) {
            warn!(operation_id = %id, error = %e, "duplicate operation id");
            return Flow::Close(CloseStatus::subscriber_exists(&id));
        }
        counter!(OPERATIONS_TOTAL).increment(1);

        let ctx = OperationContext {
            id,
            handle,
            registry: Arc::clone(&self.registry),
            codec: Arc::clone(&self.codec),
            outbound: self.outbound.clone(),
        };
        let _ = self
            .tasks
            .spawn(run_operation(ctx, Arc::clone(&self.gateway), input));
        Flow::Continue
    }

    fn on_complete(&self, id: Option<&str>) {
        let Some(id) = id else {
            debug!("complete without id ignored");
            return;
        };
        if self.registry.cancel_and_remove(id) {
            debug!(operation_id = id, "operation completed by client");
        } else {
            debug!(operation_id = id, "complete for unknown operation ignored");
        }
    }
}
