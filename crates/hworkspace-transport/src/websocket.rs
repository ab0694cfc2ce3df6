//! Socket.IO channel over a WebSocket, using `tokio-tungstenite`.
//!
//! Each channel is driven by one background task (the pump) that owns the
//! socket. It answers Engine.IO heartbeats, forwards inbound events as
//! [`ChannelEvent::Data`], writes queued outbound events, and on an
//! unrequested drop runs the reconnect policy from
//! [`ReconnectConfig`](crate::ReconnectConfig).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::packet::{self, Packet};
use crate::{
    Channel, ChannelEvent, ChannelEvents, ChannelId, ConnectConfig, Connector, ServerAddress,
    TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A transport that finished the Engine.IO and namespace handshakes.
struct Link {
    ws: WsStream,
    id: ChannelId,
    /// Silence longer than this means the server is gone.
    idle_limit: Duration,
}

enum Outbound {
    /// A fully framed event packet.
    Frame(String),
    Close,
}

/// How a connected phase of the pump ended.
enum Ended {
    /// The owner asked for the close (or went away).
    Requested,
    /// The transport dropped on its own.
    Lost(String),
}

/// State shared between a channel handle and its pump.
struct Shared {
    id: watch::Sender<ChannelId>,
    live: AtomicBool,
    closed: AtomicBool,
}

/// A [`Connector`] that opens Socket.IO channels over WebSockets.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: ConnectConfig,
}

impl WebSocketConnector {
    /// Creates a connector with the given settings.
    pub fn new(config: ConnectConfig) -> Self {
        Self { config }
    }

    /// Returns the connector's settings.
    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }
}

impl Connector for WebSocketConnector {
    type Channel = WebSocketChannel;

    fn connect(
        &self,
        address: &ServerAddress,
    ) -> impl Future<Output = Result<(WebSocketChannel, ChannelEvents), TransportError>> + Send
    {
        let url = address.websocket_url();
        let config = self.config.clone();

        async move {
            let link = open(&url, config.connect_timeout).await?;
            tracing::debug!(id = %link.id, %url, "channel connected");

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let shared = Arc::new(Shared {
                id: watch::Sender::new(link.id.clone()),
                live: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            });

            tokio::spawn(pump(
                link,
                url,
                config,
                Arc::clone(&shared),
                outbound_rx,
                events_tx,
            ));

            Ok((
                WebSocketChannel {
                    shared,
                    outbound: outbound_tx,
                },
                events_rx,
            ))
        }
    }
}

/// A live WebSocket channel.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct WebSocketChannel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Channel for WebSocketChannel {
    fn id(&self) -> ChannelId {
        self.shared.id.borrow().clone()
    }

    fn emit(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.shared.live.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let text = packet::encode_event(frame)?;
        self.outbound
            .send(Outbound::Frame(text))
            .map_err(|_| TransportError::Closed)
    }

    fn disconnect(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.live.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Close);
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Opens the transport and joins the main namespace, within `deadline`.
async fn open(url: &str, deadline: Duration) -> Result<Link, TransportError> {
    match tokio::time::timeout(deadline, handshake(url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ConnectTimeout),
    }
}

async fn handshake(url: &str) -> Result<Link, TransportError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let mut engine = None;
    loop {
        let text = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Connection(
                    "closed during handshake".into(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Connection(e.to_string())),
        };

        match packet::decode(text.as_str())? {
            Packet::Open(opened) if engine.is_none() => {
                ws.send(Message::text(packet::CONNECT))
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))?;
                engine = Some(opened);
            }
            Packet::Connect { sid } => {
                let Some(opened) = engine else {
                    return Err(TransportError::Connection(
                        "namespace connect before open packet".into(),
                    ));
                };
                let idle_limit = opened.idle_limit();
                return Ok(Link {
                    ws,
                    id: ChannelId::new(sid.unwrap_or(opened.sid)),
                    idle_limit,
                });
            }
            Packet::ConnectError(message) => return Err(TransportError::Connection(message)),
            Packet::Ping => ws
                .send(Message::text(packet::PONG))
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?,
            Packet::Close | Packet::Disconnect => {
                return Err(TransportError::Connection(
                    "closed during handshake".into(),
                ));
            }
            other => tracing::trace!(?other, "ignoring packet during handshake"),
        }
    }
}

async fn pump(
    link: Link,
    url: String,
    config: ConnectConfig,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let Link {
        mut ws,
        mut idle_limit,
        ..
    } = link;

    loop {
        let ended = run_connected(&mut ws, idle_limit, &mut outbound, &events).await;
        shared.live.store(false, Ordering::SeqCst);

        let reason = match ended {
            Ended::Requested => {
                let _ = ws.close(None).await;
                tracing::debug!("channel closed by client");
                let _ = events.send(ChannelEvent::Disconnect {
                    reason: "client disconnect".into(),
                });
                return;
            }
            Ended::Lost(reason) => reason,
        };

        // Frames queued while the socket was failing never reached it.
        let (dropped, close_requested) = drain_queued(&mut outbound);
        if dropped > 0 {
            report_dropped(&events, dropped);
        }

        tracing::info!(%reason, "channel transport dropped");
        if events
            .send(ChannelEvent::Disconnect { reason })
            .is_err()
            || close_requested
            || !config.reconnect.enabled
        {
            return;
        }

        let Some((link, attempt)) = reconnect(&url, &config, &mut outbound, &events).await else {
            return;
        };
        if shared.closed.load(Ordering::SeqCst) {
            return;
        }

        ws = link.ws;
        idle_limit = link.idle_limit;
        tracing::info!(id = %link.id, attempt, "channel reconnected");
        shared.id.send_replace(link.id);
        shared.live.store(true, Ordering::SeqCst);
        if events.send(ChannelEvent::Reconnect { attempt }).is_err() {
            let _ = ws.close(None).await;
            return;
        }
    }
}

async fn run_connected(
    ws: &mut WsStream,
    idle_limit: Duration,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> Ended {
    let silence = tokio::time::sleep(idle_limit);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = ws.send(Message::text(text)).await {
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                        return Ended::Lost("transport error".into());
                    }
                }
                Some(Outbound::Close) | None => return Ended::Requested,
            },
            msg = ws.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return Ended::Lost("transport close".into());
                    }
                    Some(Ok(_)) => continue, // binary/ping/pong/frame
                    Some(Err(e)) => {
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                        return Ended::Lost("transport error".into());
                    }
                };
                silence
                    .as_mut()
                    .reset(tokio::time::Instant::now() + idle_limit);

                match packet::decode(text.as_str()) {
                    Ok(Packet::Event(args)) => {
                        if events.send(ChannelEvent::Data(args)).is_err() {
                            return Ended::Requested;
                        }
                    }
                    Ok(Packet::Ping) => {
                        if let Err(e) = ws.send(Message::text(packet::PONG)).await {
                            let _ = events.send(ChannelEvent::Error(e.to_string()));
                            return Ended::Lost("transport error".into());
                        }
                    }
                    Ok(Packet::Close) => return Ended::Lost("transport close".into()),
                    Ok(Packet::Disconnect) => return Ended::Lost("io server disconnect".into()),
                    Ok(Packet::ConnectError(message)) => {
                        let _ = events.send(ChannelEvent::Error(message));
                    }
                    Ok(other) => tracing::trace!(?other, "ignoring packet"),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping malformed packet");
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                    }
                }
            }
            _ = &mut silence => {
                tracing::debug!(?idle_limit, "no heartbeat from server");
                return Ended::Lost("ping timeout".into());
            }
        }
    }
}

/// Runs the retry policy until a transport opens, the policy gives up,
/// or the owner closes the channel.
async fn reconnect(
    url: &str,
    config: &ConnectConfig,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> Option<(Link, u32)> {
    let policy = &config.reconnect;
    let mut attempt: u32 = 0;

    loop {
        if policy.is_exhausted(attempt) {
            tracing::warn!(attempts = attempt, "channel reconnection gave up");
            let _ = events.send(ChannelEvent::ReconnectFailed);
            return None;
        }
        attempt += 1;

        let delay = policy.delay_for_attempt(attempt, rand::rng().random::<f64>());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_close(outbound, events) => return None,
        }

        events.send(ChannelEvent::ReconnectAttempt { attempt }).ok()?;
        tracing::debug!(attempt, ?delay, "reconnecting channel");

        let result = tokio::select! {
            result = open(url, config.connect_timeout) => result,
            _ = wait_for_close(outbound, events) => return None,
        };

        match result {
            Ok(link) => return Some((link, attempt)),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "reconnection attempt failed");
                events
                    .send(ChannelEvent::ReconnectError {
                        attempt,
                        reason: e.to_string(),
                    })
                    .ok()?;
            }
        }
    }
}

/// Resolves once the owner closes the channel or drops its handle.
async fn wait_for_close(
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(cmd) = outbound.recv().await {
        match cmd {
            Outbound::Close => return,
            Outbound::Frame(_) => report_dropped(events, 1),
        }
    }
}

/// Empties the outbound queue without blocking.
///
/// Returns how many frames were discarded and whether a close was among
/// them (or the owner is gone).
fn drain_queued(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> (usize, bool) {
    let mut dropped = 0;
    loop {
        match outbound.try_recv() {
            Ok(Outbound::Frame(_)) => dropped += 1,
            Ok(Outbound::Close) => return (dropped, true),
            Err(mpsc::error::TryRecvError::Empty) => return (dropped, false),
            Err(mpsc::error::TryRecvError::Disconnected) => return (dropped, true),
        }
    }
}

/// Surfaces frames that were accepted by `emit` but never written.
fn report_dropped(events: &mpsc::UnboundedSender<ChannelEvent>, dropped: usize) {
    tracing::warn!(dropped, "discarding frames queued before the transport dropped");
    let _ = events.send(ChannelEvent::Error(format!(
        "{dropped} queued frame(s) discarded: transport dropped before they were written"
    )));
}
