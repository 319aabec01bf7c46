//! One connected bridge session.
//!
//! On connect the agent announces itself with a handshake, then:
//! - sends `{"type":"ping"}` on every heartbeat tick,
//! - answers each inbound request on its own task,
//! - replies `pong` to server pings,
//! - drops the session once the server has been silent for
//!   [`MISSED_HEARTBEATS`] heartbeat intervals.
//!
//! All writes go through a single writer task fed by an mpsc channel, so
//! request tasks never contend for the sink.

use std::sync::Arc;
use std::time::Duration;

use atelier_bridge::messages::{encode, parse_peer_inbound, ControlFrame, PeerInbound};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::handlers::HandlerRegistry;

/// How long a cancelled session waits for its close frame to flush.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Heartbeat intervals without any inbound frame before the peer is
/// considered dead.
pub const MISSED_HEARTBEATS: u32 = 3;

/// Connect to the bridge and serve the connection until it ends.
///
/// Errors only if the connection could not be established.
pub async fn connect_and_serve(
    config: &AgentConfig,
    registry: Arc<HandlerRegistry>,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    tracing::info!(url = %config.ws_url, "Connecting to bridge");
    let (ws_stream, _response) = connect_async(config.ws_url.as_str()).await?;
    tracing::info!(url = %config.ws_url, "Bridge connected");

    serve(ws_stream, &config.name, config.heartbeat_interval, registry, cancel).await;
    Ok(())
}

/// Drive an established WebSocket until it closes or `cancel` fires.
pub async fn serve<S>(
    ws_stream: WebSocketStream<S>,
    name: &str,
    heartbeat: Duration,
    registry: Arc<HandlerRegistry>,
    cancel: &CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                tracing::warn!(error = %e, "Bridge write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let handshake = ControlFrame::Handshake {
        client: name.to_string(),
    };
    if tx.send(Message::Text(encode(&handshake))).is_err() {
        writer.abort();
        return;
    }

    let start = tokio::time::Instant::now() + heartbeat;
    let mut ticker = tokio::time::interval_at(start, heartbeat);
    let silence_limit = heartbeat * MISSED_HEARTBEATS;
    let mut last_seen = tokio::time::Instant::now();

    let cancelled = loop {
        tokio::select! {
            _ = cancel.cancelled() => break true,
            _ = &mut writer => {
                tracing::warn!("Bridge writer stopped");
                break false;
            }
            _ = ticker.tick() => {
                if last_seen.elapsed() >= silence_limit {
                    tracing::warn!(
                        silent_secs = last_seen.elapsed().as_secs(),
                        "Bridge peer silent, dropping session",
                    );
                    break false;
                }
                tracing::trace!("Sending heartbeat");
                if tx.send(Message::Text(encode(&ControlFrame::Ping))).is_err() {
                    break false;
                }
            }
            msg = stream.next() => {
                if let Some(Ok(_)) = &msg {
                    last_seen = tokio::time::Instant::now();
                }
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&text, &tx, &registry),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Bridge closed the connection");
                        break false;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong frames are answered by tungstenite; binary is unused.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Bridge receive error");
                        break false;
                    }
                    None => {
                        tracing::info!("Bridge stream exhausted");
                        break false;
                    }
                }
            }
        }
    };

    if cancelled {
        tracing::info!("Closing bridge session");
        let _ = tx.send(Message::Close(None));
        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }
    } else {
        writer.abort();
    }
}

fn handle_text(text: &str, tx: &mpsc::UnboundedSender<Message>, registry: &Arc<HandlerRegistry>) {
    match parse_peer_inbound(text) {
        Ok(PeerInbound::Request(request)) => {
            tracing::debug!(id = %request.id, kind = %request.kind, "Bridge request received");
            let registry = Arc::clone(registry);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = registry.dispatch(request).await;
                // The session may have ended while the handler ran.
                let _ = tx.send(Message::Text(encode(&response)));
            });
        }
        Ok(PeerInbound::Control(ControlFrame::HandshakeAck)) => {
            tracing::info!("Bridge handshake acknowledged");
        }
        Ok(PeerInbound::Control(ControlFrame::Ping)) => {
            let _ = tx.send(Message::Text(encode(&ControlFrame::Pong)));
        }
        Ok(PeerInbound::Control(ControlFrame::Pong)) => {
            tracing::trace!("Heartbeat acknowledged");
        }
        Ok(PeerInbound::Control(other)) => {
            tracing::debug!(?other, "Ignoring control frame");
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Unknown or malformed bridge frame");
        }
    }
}
