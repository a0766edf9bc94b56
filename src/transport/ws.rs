//! WebSocket transport: one connection, calls multiplexed by SN.
//!
//! Each connection runs two tasks:
//! - a writer draining an mpsc queue into the socket sink;
//! - a reader routing `res` frames to waiting calls and broadcasting `msg` frames.
//!
//! When the connection goes away every waiting call settles with a network error.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{ApiRequest, Transport};
use crate::client::ClientConfig;
use crate::codec::{frame_return, ClientFrame, Codec, ServerFrame, WireFormat};
use crate::logger::{noop_sink, CallEvent, LogSink, MsgDirection};
use crate::protocol::ServiceDef;
use crate::types::{ApiError, ApiReturn};

const OUTBOUND_CAPACITY: usize = 256;
const MSG_CHANNEL_CAPACITY: usize = 256;

/// A server-pushed message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMsg {
    pub service: String,
    pub data: Value,
}

struct Connection {
    id: u64,
    outbound: mpsc::Sender<Message>,
    shutdown: CancellationToken,
}

struct Shared {
    wire: WireFormat,
    conn: Mutex<Option<Connection>>,
    waiting: Mutex<HashMap<u64, oneshot::Sender<ApiReturn<Value>>>>,
    msgs: broadcast::Sender<InboundMsg>,
    logger: Arc<dyn LogSink>,
}

impl Shared {
    fn conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn waiting(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<ApiReturn<Value>>>> {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outbound(&self) -> Option<mpsc::Sender<Message>> {
        self.conn().as_ref().map(|c| c.outbound.clone())
    }

    async fn on_frame(&self, buf: &[u8]) {
        let frame = match self.wire.decode_frame(buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("dropping undecodable frame: {}", e.message);
                return;
            }
        };
        match frame {
            ServerFrame::Res {
                sn,
                is_succ,
                res,
                err,
            } => {
                let waiter = self.waiting().remove(&sn);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(frame_return(is_succ, res, err));
                    }
                    None => tracing::debug!(sn, "response for a call no longer waiting"),
                }
            }
            ServerFrame::Msg { service, data } => {
                self.logger
                    .report(CallEvent::Msg {
                        direction: MsgDirection::Recv,
                        service: service.clone(),
                        data: data.clone(),
                    })
                    .await;
                let _ = self.msgs.send(InboundMsg { service, data });
            }
        }
    }

    /// Connection `id` is gone: forget it and fail every waiting call.
    fn on_closed(&self, id: u64, reason: &str) {
        {
            let mut conn = self.conn();
            if conn.as_ref().map(|c| c.id) == Some(id) {
                *conn = None;
            }
        }
        self.fail_waiting(reason);
    }

    fn fail_waiting(&self, reason: &str) {
        let drained: Vec<_> = self.waiting().drain().collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "failing calls waiting on closed connection");
        }
        for (_, tx) in drained {
            let _ = tx.send(ApiReturn::Err(
                ApiError::network(reason.to_string()).with_code("WS_CLOSED"),
            ));
        }
    }
}

/// Removes a call from the correlation table when its future goes away.
struct WaitingGuard<'a> {
    shared: &'a Shared,
    sn: u64,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.shared.waiting().remove(&self.sn);
    }
}

pub struct WsTransport {
    server: String,
    shared: Arc<Shared>,
    connecting: tokio::sync::Mutex<()>,
    next_conn_id: AtomicU64,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_logger(config, noop_sink())
    }

    pub fn with_logger(config: &ClientConfig, logger: Arc<dyn LogSink>) -> Self {
        let (msgs, _) = broadcast::channel(MSG_CHANNEL_CAPACITY);
        Self {
            server: config.server.clone(),
            shared: Arc::new(Shared {
                wire: WireFormat::from_config(config),
                conn: Mutex::new(None),
                waiting: Mutex::new(HashMap::new()),
                msgs,
                logger,
            }),
            connecting: tokio::sync::Mutex::new(()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .conn()
            .as_ref()
            .map(|c| !c.shutdown.is_cancelled())
            .unwrap_or(false)
    }

    /// Open the connection. Connecting while already connected is a no-op.
    pub async fn connect(&self) -> Result<(), ApiError> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let (socket, _resp) = tokio_tungstenite::connect_async(self.server.as_str())
            .await
            .map_err(|e| {
                ApiError::network(format!("WebSocket connect to {} failed: {}", self.server, e))
                    .with_code("WS_CONNECT")
            })?;
        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let shutdown = CancellationToken::new();
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    next = outbound_rx.recv() => match next {
                        Some(msg) => {
                            if let Err(e) = sink.send(msg).await {
                                tracing::warn!(conn = id, "WebSocket write failed: {}", e);
                                writer_shutdown.cancel();
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        let shared = self.shared.clone();
        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = reader_shutdown.cancelled() => break "Connection closed by client",
                    next = stream.next() => match next {
                        Some(Ok(Message::Text(text))) => shared.on_frame(text.as_bytes()).await,
                        Some(Ok(Message::Binary(buf))) => shared.on_frame(&buf).await,
                        Some(Ok(Message::Close(_))) | None => break "Connection closed by server",
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(conn = id, "WebSocket read failed: {}", e);
                            break "Connection lost";
                        }
                    },
                }
            };
            reader_shutdown.cancel();
            shared.on_closed(id, reason);
            tracing::debug!(conn = id, reason, "WebSocket reader stopped");
        });

        *self.shared.conn() = Some(Connection {
            id,
            outbound,
            shutdown,
        });
        tracing::info!(conn = id, server = self.server.as_str(), "WebSocket connected");
        Ok(())
    }

    /// Close the connection. Calls still waiting settle with a `WS_CLOSED` network error.
    pub async fn disconnect(&self) {
        let _guard = self.connecting.lock().await;
        let conn = self.shared.conn().take();
        if let Some(conn) = conn {
            conn.shutdown.cancel();
            tracing::info!(conn = conn.id, "WebSocket disconnected");
        }
        self.shared.fail_waiting("Connection closed by client");
    }

    /// Subscribe to every server-pushed message.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMsg> {
        self.shared.msgs.subscribe()
    }

    fn to_message(&self, buf: Vec<u8>) -> Result<Message, ApiError> {
        match self.shared.wire.codec {
            Codec::Json => String::from_utf8(buf).map(Message::Text).map_err(|e| {
                ApiError::internal(format!("JSON frame is not UTF-8: {}", e)).with_code("ENCODE")
            }),
            Codec::MsgPack => Ok(Message::Binary(buf)),
        }
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), ApiError> {
        let outbound = self.shared.outbound().ok_or_else(not_connected)?;
        let msg = self.to_message(self.shared.wire.encode_frame(frame)?)?;
        outbound.send(msg).await.map_err(|_| {
            ApiError::network("Connection closed before the frame was sent").with_code("WS_CLOSED")
        })
    }
}

fn not_connected() -> ApiError {
    ApiError::network("WebSocket is not connected").with_code("WS_NOT_CONNECTED")
}

#[async_trait]
impl Transport for WsTransport {
    async fn call(&self, req: ApiRequest) -> ApiReturn<Value> {
        if !self.is_connected() {
            return ApiReturn::Err(not_connected());
        }
        let frame = ClientFrame::Req {
            service: req.service.name.clone(),
            sn: req.sn,
            data: self.shared.wire.prepare(req.params),
        };

        // Register before sending so a fast response cannot slip past.
        let (tx, rx) = oneshot::channel();
        self.shared.waiting().insert(req.sn, tx);
        let _guard = WaitingGuard {
            shared: &self.shared,
            sn: req.sn,
        };

        if let Err(e) = self.send_frame(&frame).await {
            return ApiReturn::Err(e);
        }
        match rx.await {
            Ok(ret) => ret,
            Err(_) => ApiReturn::Err(
                ApiError::network("Connection closed while waiting for response")
                    .with_code("WS_CLOSED"),
            ),
        }
    }

    async fn send_msg(&self, service: &ServiceDef, msg: Value) -> Result<(), ApiError> {
        self.send_frame(&ClientFrame::Msg {
            service: service.name.clone(),
            data: self.shared.wire.prepare(msg),
        })
        .await
    }
}
