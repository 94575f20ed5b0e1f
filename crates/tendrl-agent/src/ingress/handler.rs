//! Per-connection protocol handling.
//!
//! Each accepted connection gets its own handler task that decodes the
//! client's JSON stream and routes every message:
//!
//! - `msg_check` — poll the upstream and write the result (or the literal
//!   `204` when nothing is pending) back on the connection
//! - `publish` with `wait` — send inline and echo the upstream reply
//! - `publish` / `dest_publish` — enqueue for batched forwarding; no reply
//! - anything else — error envelope, connection stays open
//!
//! Malformed JSON is logged and skipped; only end-of-stream, an I/O error,
//! or shutdown closes the connection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec::MessageDecoder;
use crate::messages::{Limit, Message, MsgType, ResponseEnvelope};
use crate::queue::{QueueClosed, QueueSender};
use crate::upstream::UpstreamClient;

/// Reply written when a poll finds no pending messages: the three ASCII
/// bytes `204`, not an HTTP status line.
pub const NO_MESSAGES_REPLY: &[u8] = b"204";

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Routes decoded messages to the queue or the upstream client.
///
/// Shared by every connection handler; cloning is cheap.
#[derive(Clone)]
pub struct Dispatcher {
    queue: QueueSender,
    upstream: Arc<UpstreamClient>,
}

impl Dispatcher {
    pub fn new(queue: QueueSender, upstream: Arc<UpstreamClient>) -> Self {
        Self { queue, upstream }
    }

    /// Handles one decoded message and returns the reply bytes to write
    /// back, or `None` for fire-and-forget publishes.
    ///
    /// `Err(QueueClosed)` means the agent is shutting down; the connection
    /// should be dropped.
    pub async fn dispatch(&self, message: Message) -> Result<Option<Vec<u8>>, QueueClosed> {
        if let Err(e) = message.context.validate() {
            warn!("rejecting message: {e}");
            return Ok(Some(ResponseEnvelope::error(e.to_string()).to_bytes()));
        }

        match message.msg_type {
            Some(MsgType::MsgCheck) => {
                let limit = match message.context.limit {
                    Limit::Absent => 1,
                    Limit::Int(limit) => limit,
                    Limit::Invalid => {
                        return Ok(Some(
                            ResponseEnvelope::error("Invalid limit type").to_bytes(),
                        ));
                    }
                };
                match self.upstream.poll(limit).await {
                    Ok(messages) if messages.is_empty() => Ok(Some(NO_MESSAGES_REPLY.to_vec())),
                    Ok(messages) => match serde_json::to_vec(&messages) {
                        Ok(bytes) => Ok(Some(bytes)),
                        Err(e) => {
                            error!("failed to encode poll result: {e}");
                            Ok(Some(ResponseEnvelope::error(e.to_string()).to_bytes()))
                        }
                    },
                    Err(e) => Ok(Some(ResponseEnvelope::error(e.to_string()).to_bytes())),
                }
            }
            Some(MsgType::Publish | MsgType::DestPublish) => {
                if message.context.wait_response {
                    let reply = self.upstream.post_single(&message).await;
                    Ok(Some(reply.to_string().into_bytes()))
                } else {
                    // May block under backpressure until the queue has room.
                    self.queue.offer(message).await?;
                    Ok(None)
                }
            }
            Some(MsgType::Unknown) | None => {
                Ok(Some(ResponseEnvelope::error("Unknown message type").to_bytes()))
            }
        }
    }
}

/// One handler per accepted connection; owns the stream exclusively.
pub struct ConnectionHandler {
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    pub fn new(dispatcher: Dispatcher, shutdown: CancellationToken) -> Self {
        Self {
            dispatcher,
            shutdown,
        }
    }

    /// Reads and serves the connection until end-of-stream, an I/O error, or
    /// shutdown.
    pub async fn run<S>(self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut decoder = MessageDecoder::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        'conn: loop {
            // Serve everything already decodable before reading again.
            loop {
                match decoder.next() {
                    Ok(Some(message)) => {
                        let reply = match self.dispatcher.dispatch(message).await {
                            Ok(reply) => reply,
                            Err(QueueClosed(_)) => {
                                debug!("queue closed, dropping connection");
                                break 'conn;
                            }
                        };
                        if let Some(bytes) = reply {
                            if let Err(e) = stream.write_all(&bytes).await {
                                debug!("write error, closing connection: {e}");
                                break 'conn;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // A malformed message does not close the connection.
                        error!("error decoding message: {e}");
                    }
                }
            }

            let read = tokio::select! {
                read = stream.read(&mut chunk) => read,
                () = self.shutdown.cancelled() => break,
            };
            match read {
                Ok(0) => {
                    debug!("connection closed by client");
                    break;
                }
                Ok(n) => decoder.extend(&chunk[..n]),
                Err(e) => {
                    debug!("read error, closing connection: {e}");
                    break;
                }
            }
        }
    }
}
