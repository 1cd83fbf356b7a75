//! Correlating RPC client over a single WebSocket

use super::pending::{PendingTable, Reply};
use super::types::{TransportConfig, TransportError, TransportEvent};
use crate::protocol::{ApiError, Request};
use crate::telemetry;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Command {
    Request {
        payload: Value,
        reply: Reply,
        /// Credential to replay after a reconnect
        token: Option<String>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
}

/// Why a connection's drive loop ended
enum Closed {
    Deliberate,
    Unexpected(String),
}

/// Handle to an in-flight request; resolves with the matching response
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Value, TransportError>>,
}

impl Future for PendingReply {
    type Output = Result<Value, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(TransportError::Disconnected)))
    }
}

/// Pipelining RPC client with reconnect and re-authorization
///
/// Cloning is cheap; all clones share the same connection task.
#[derive(Clone)]
pub struct RpcClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    url: String,
}

impl RpcClient {
    /// Open the connection and spawn the task that owns it
    ///
    /// Returns the client and a receiver for pushes and connection events.
    pub async fn connect(
        config: TransportConfig,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        let stream = open(&config).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(1024);
        let url = config.url.clone();

        let task = ConnectionTask {
            config,
            pending: PendingTable::new(),
            token: None,
            cmd_rx,
            event_tx,
        };
        tokio::spawn(task.run(stream));

        Ok((Self { cmd_tx, url }, event_rx))
    }

    /// Get the connected URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a request; any number may be outstanding at once
    pub fn send(&self, request: &Request) -> PendingReply {
        let (reply, rx) = oneshot::channel();
        match serde_json::to_value(request) {
            Ok(payload) => {
                let token = match request {
                    Request::Authorize { authorize } => Some(authorize.clone()),
                    _ => None,
                };
                // A closed task drops the reply, which resolves as Disconnected.
                let _ = self.cmd_tx.send(Command::Request {
                    payload,
                    reply,
                    token,
                });
            }
            Err(e) => {
                let _ = reply.send(Err(e.into()));
            }
        }
        PendingReply { rx }
    }

    /// Close the connection and cancel any scheduled reconnect. Idempotent.
    pub async fn close(&self) {
        let (done, wait) = oneshot::channel();
        if self.cmd_tx.send(Command::Disconnect { done }).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn open(config: &TransportConfig) -> Result<WsStream, TransportError> {
    tracing::info!(url = %config.url, "Connecting to venue");

    let (stream, _response) = tokio::time::timeout(config.request_timeout, connect_async(&config.url))
        .await
        .map_err(|_| TransportError::Connection("handshake timed out".into()))?
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    tracing::info!("Venue connected");
    Ok(stream)
}

fn with_req_id(mut payload: Value, id: u64) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert("req_id".to_string(), Value::from(id));
    }
    payload
}

/// Resolve a correlated response, or forward the message as a push.
/// Never waits on the consumer: a full event queue drops the push.
fn route_inbound(
    pending: &mut PendingTable,
    event_tx: &mpsc::Sender<TransportEvent>,
    text: &str,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping unparseable message");
            return;
        }
    };

    let req_id = value.get("req_id").and_then(Value::as_u64);
    match req_id {
        Some(id) if pending.contains(id) => {
            let result = match value.get("error") {
                Some(err) => Err(ApiError::from_value(err).into()),
                None => Ok(value),
            };
            pending.resolve(id, result);
            telemetry::set_pending_requests(pending.len());
        }
        _ => match event_tx.try_send(TransportEvent::Push(value)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event queue full, dropping push");
            }
            // Consumer gone, nothing left to deliver to
            Err(TrySendError::Closed(_)) => {}
        },
    }
}

/// Owns the socket and the correlation table; the only writer of either
struct ConnectionTask {
    config: TransportConfig,
    pending: PendingTable,
    token: Option<String>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl ConnectionTask {
    async fn run(mut self, stream: WsStream) {
        let mut stream = stream;

        loop {
            let closed = self.drive(stream).await;

            let failed = self.pending.fail_all(TransportError::Disconnected);
            telemetry::set_pending_requests(0);
            if failed > 0 {
                tracing::warn!(failed, "Failed in-flight requests on disconnect");
            }

            match closed {
                Closed::Deliberate => {
                    tracing::info!("Venue connection closed");
                    let _ = self.event_tx.send(TransportEvent::Closed).await;
                    return;
                }
                Closed::Unexpected(reason) => {
                    tracing::warn!(reason = %reason, "Venue connection lost");
                    match self.reconnect().await {
                        Some(s) => {
                            stream = s;
                            let _ = self.event_tx.send(TransportEvent::Reconnected).await;
                        }
                        None => return,
                    }
                }
            }
        }
    }

    /// Pump one connection until it closes
    async fn drive(&mut self, stream: WsStream) -> Closed {
        let (mut write, mut read) = stream.split();

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        ping_interval.tick().await;
        let mut waiting_for_pong = false;

        loop {
            let deadline = self.pending.next_deadline();

            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            route_inbound(&mut self.pending, &self.event_tx, &text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return Closed::Unexpected(e.to_string());
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Closed::Unexpected("close frame from venue".into());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Closed::Unexpected(e.to_string());
                        }
                        None => {
                            return Closed::Unexpected("stream ended unexpectedly".into());
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Request { payload, reply, token }) => {
                            if token.is_some() {
                                self.token = token;
                            }
                            let deadline = Instant::now() + self.config.request_timeout;
                            let id = self.pending.register(reply, deadline);
                            telemetry::set_pending_requests(self.pending.len());
                            let text = with_req_id(payload, id).to_string();
                            if let Err(e) = write.send(Message::Text(text)).await {
                                return Closed::Unexpected(e.to_string());
                            }
                        }
                        Some(Command::Disconnect { done }) => {
                            let _ = write.send(Message::Close(None)).await;
                            let _ = done.send(());
                            return Closed::Deliberate;
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Closed::Deliberate;
                        }
                    }
                }

                _ = async {
                    match deadline {
                        Some(d) => sleep_until(d).await,
                        None => std::future::pending().await,
                    }
                } => {
                    for req_id in self.pending.expire(Instant::now()) {
                        tracing::warn!(req_id, "Request timed out");
                    }
                    telemetry::set_pending_requests(self.pending.len());
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Closed::Unexpected("pong timeout".into());
                    }
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        return Closed::Unexpected(e.to_string());
                    }
                    waiting_for_pong = true;
                }
            }
        }
    }

    /// Reconnect with exponential backoff; `None` means give up
    async fn reconnect(&mut self) -> Option<WsStream> {
        for attempt in 1..=self.config.max_reconnect_attempts {
            let delay = self.config.reconnect_delay(attempt);
            telemetry::record_reconnect();
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting to venue");
            let _ = self
                .event_tx
                .send(TransportEvent::Reconnecting { attempt, delay })
                .await;

            if !self.wait_backoff(delay).await {
                let _ = self.event_tx.send(TransportEvent::Closed).await;
                return None;
            }

            let result = match open(&self.config).await {
                Ok(mut stream) => match self.reauthorize(&mut stream).await {
                    Ok(()) => Ok(stream),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match result {
                Ok(stream) => {
                    tracing::info!(attempt, "Venue reconnected");
                    return Some(stream);
                }
                Err(e) => {
                    self.pending.fail_all(TransportError::Disconnected);
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        tracing::error!("Max reconnection attempts reached");
        let _ = self
            .event_tx
            .send(TransportEvent::Fatal(TransportError::MaxReconnectsExceeded))
            .await;
        None
    }

    /// Sleep out the backoff; requests arriving meanwhile fail immediately.
    /// Returns false on a deliberate disconnect.
    async fn wait_backoff(&mut self, delay: std::time::Duration) -> bool {
        let backoff = sleep(delay);
        tokio::pin!(backoff);

        loop {
            tokio::select! {
                _ = &mut backoff => return true,
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Request { reply, token, .. }) => {
                            if token.is_some() {
                                self.token = token;
                            }
                            let _ = reply.send(Err(TransportError::Disconnected));
                        }
                        Some(Command::Disconnect { done }) => {
                            let _ = done.send(());
                            return false;
                        }
                        None => return false,
                    }
                }
            }
        }
    }

    /// Replay the stored credential on a fresh connection
    async fn reauthorize(&mut self, stream: &mut WsStream) -> Result<(), TransportError> {
        let Some(token) = self.token.clone() else {
            return Ok(());
        };

        let (reply, mut rx) = oneshot::channel();
        let deadline = Instant::now() + self.config.request_timeout;
        let id = self.pending.register(reply, deadline);
        let payload = with_req_id(serde_json::to_value(Request::authorize(token))?, id);
        stream
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            route_inbound(&mut self.pending, &self.event_tx, &text);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(TransportError::Connection(e.to_string())),
                        None => return Err(TransportError::Connection("stream ended".into())),
                    }
                }
                _ = sleep_until(deadline) => {
                    self.pending.expire(Instant::now());
                }
            }

            if let Ok(result) = rx.try_recv() {
                return result.map(|_| ());
            }
        }
    }
}
