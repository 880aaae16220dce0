//! Result Stream Adapter: turns gateway output into the frame lifecycle of
//! one operation and pushes the frames to the connection.
//!
//! Every operation produces zero or more `next` frames followed by exactly
//! one terminal frame (`complete` or `error`). Failures inside an operation
//! become an `error` frame for that operation and never close the
//! connection.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt, stream};
use gqlws_core::{Frame, FrameCodec, GraphQlError, MessageType};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::gateway::{ExecutionGateway, ExecutionOutput, OperationInput};
use crate::metrics::OPERATION_ERRORS_TOTAL;
use crate::registry::{OperationHandle, OperationRegistry};
use crate::session::Outbound;

/// Boxed stream of frames for one operation.
pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// Map gateway output to the frames of operation `id`.
///
/// - single result, no errors: `next`, `complete`
/// - single result with errors: `error` carrying the error list
/// - stream: `next` per item, then `complete`; an item error yields one
///   `error` and ends the stream
pub fn into_frames(id: String, output: ExecutionOutput) -> FrameStream {
    match output {
        ExecutionOutput::Single(result) if result.has_errors() => {
            Box::pin(stream::iter([Frame::error(id, &result.errors)]))
        }
        ExecutionOutput::Single(result) => Box::pin(stream::iter([
            Frame::next(id.clone(), result.to_specification()),
            Frame::complete(id),
        ])),
        ExecutionOutput::Stream(mut results) => Box::pin(async_stream::stream! {
            let mut failed = false;
            while let Some(item) = results.next().await {
                match item {
                    Ok(result) => yield Frame::next(id.clone(), result.to_specification()),
                    Err(e) => {
                        yield Frame::error(id.clone(), &[e.to_graphql_error()]);
                        failed = true;
                        break;
                    }
                }
            }
            if !failed {
                yield Frame::complete(id);
            }
        }),
    }
}

/// How an operation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationEnd {
    /// `complete` was sent.
    Completed,
    /// `error` was sent.
    Failed,
    /// Cancelled by the client, connection close, or shutdown.
    Cancelled,
    /// The outbound channel is gone.
    Disconnected,
}

/// Everything one operation task needs besides its input.
pub(crate) struct OperationContext {
    pub(crate) id: String,
    pub(crate) handle: OperationHandle,
    pub(crate) registry: Arc<OperationRegistry>,
    pub(crate) codec: Arc<dyn FrameCodec>,
    pub(crate) outbound: mpsc::Sender<Outbound>,
}

impl OperationContext {
    /// Queue one encoded frame unless the operation was cancelled first.
    async fn send(&self, text: String) -> Result<(), OperationEnd> {
        tokio::select! {
            biased;
            () = self.handle.cancelled() => Err(OperationEnd::Cancelled),
            sent = self.outbound.send(Outbound::Text(text)) => {
                sent.map_err(|_| OperationEnd::Disconnected)
            }
        }
    }

    /// Encode `frame`; an encoding failure is replaced by an `error` frame.
    /// Returns the text and the type of the frame actually encoded.
    fn encode(&self, frame: &Frame) -> Result<(String, MessageType), OperationEnd> {
        match self.codec.encode(frame) {
            Ok(text) => Ok((text, frame.message_type)),
            Err(e) => {
                warn!(error = %e, message_type = %frame.message_type, "frame encoding failed");
                let fallback = Frame::error(
                    self.id.clone(),
                    &[GraphQlError::data_fetching(e.to_string())],
                );
                self.codec
                    .encode(&fallback)
                    .map(|text| (text, MessageType::Error))
                    .map_err(|_| OperationEnd::Failed)
            }
        }
    }
}

/// Run one operation to its terminal frame, then release its registration.
#[instrument(skip_all, fields(operation_id = %ctx.id))]
pub(crate) async fn run_operation(
    ctx: OperationContext,
    gateway: Arc<dyn ExecutionGateway>,
    input: OperationInput,
) -> OperationEnd {
    let end = match drive(&ctx, gateway.as_ref(), input).await {
        Ok(end) | Err(end) => end,
    };
    let _ = ctx.registry.remove(&ctx.id, &ctx.handle);
    match end {
        OperationEnd::Failed => {
            counter!(OPERATION_ERRORS_TOTAL).increment(1);
            debug!("operation failed");
        }
        other => debug!(end = ?other, "operation finished"),
    }
    end
}

async fn drive(
    ctx: &OperationContext,
    gateway: &dyn ExecutionGateway,
    input: OperationInput,
) -> Result<OperationEnd, OperationEnd> {
    debug!(query = %input.query, "executing operation");
    let output = tokio::select! {
        biased;
        () = ctx.handle.cancelled() => return Err(OperationEnd::Cancelled),
        output = gateway.execute(input) => output,
    };

    let mut frames = match output {
        Ok(output) => into_frames(ctx.id.clone(), output),
        Err(e) => {
            warn!(error = %e, "execution gateway failed");
            Box::pin(stream::iter([Frame::error(ctx.id.clone(), &[e.to_graphql_error()])]))
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            () = ctx.handle.cancelled() => return Err(OperationEnd::Cancelled),
            next = frames.next() => next,
        };
        // into_frames always ends with a terminal frame
        let Some(frame) = next else {
            return Ok(OperationEnd::Completed);
        };
        let (text, sent) = ctx.encode(&frame)?;
        if sent.is_terminal() {
            // released before the client can see the terminal frame, so the
            // id is immediately reusable
            let _ = ctx.registry.remove(&ctx.id, &ctx.handle);
        }
        ctx.send(text).await?;
        match sent {
            MessageType::Error => return Ok(OperationEnd::Failed),
            MessageType::Complete => return Ok(OperationEnd::Completed),
            _ => {}
        }
    }
}
