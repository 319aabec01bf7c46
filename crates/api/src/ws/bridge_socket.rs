use std::sync::Arc;

use atelier_bridge::{BridgeEndpoint, ConnectionHandle, Outbound};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// HTTP handler that upgrades the connection to the bridge WebSocket.
///
/// The connection becomes the active bridge once the peer sends its
/// handshake frame.
pub async fn bridge_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.bridge))
}

/// Serve one bridge socket until either side closes it.
///
/// A sender task drains the connection's frame channel into the sink; the
/// current task feeds inbound text frames to the endpoint. The read loop
/// also ends when the sender task stops, which happens when the endpoint
/// replaces this connection with a newer one.
async fn handle_socket(socket: WebSocket, bridge: Arc<BridgeEndpoint>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Bridge socket connected");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = ConnectionHandle::new(conn_id.clone(), tx);
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let message = match outbound {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Close => {
                    tracing::info!(conn_id = %sender_conn_id, "Closing replaced bridge socket");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Bridge socket sink closed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => bridge.handle_frame(&conn, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Bridge socket receive error");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    bridge.disconnect(&conn_id);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Bridge socket disconnected");
}
