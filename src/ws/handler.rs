//! Spectator WebSocket: pushes snapshots and life-cycle events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::broadcast::{fanout::encode, Subscription};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ServerMsg, SpectatorMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscription = state.fanout.subscribe();
    let subscriber_id = subscription.id;
    info!(subscriber_id, "New spectator connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let status = state.scheduler.status();
    let welcome = ServerMsg::Welcome {
        server_time: unix_millis(),
        status: &status,
    };
    let Some(welcome) = encode(&welcome) else {
        state.fanout.unsubscribe(subscriber_id);
        return;
    };
    if let Err(e) = send_bytes(&mut ws_sink, welcome).await {
        debug!(subscriber_id, error = %e, "Failed to send welcome");
        state.fanout.unsubscribe(subscriber_id);
        return;
    }

    // Replies produced by the reader go out through the writer
    let (reply_tx, reply_rx) = mpsc::channel::<Bytes>(8);
    let mut writer = tokio::spawn(write_loop(subscription, reply_rx, ws_sink));

    loop {
        tokio::select! {
            _ = &mut writer => break,
            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<SpectatorMsg>(&text) {
                    Ok(SpectatorMsg::Ping { t }) => {
                        let pong = ServerMsg::Pong {
                            t,
                            server_time: unix_millis(),
                        };
                        if let Some(pong) = encode(&pong) {
                            if reply_tx.try_send(pong).is_err() {
                                debug!(subscriber_id, "Pong dropped");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(subscriber_id, error = %e, "Failed to parse spectator message");
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!(subscriber_id, "Spectator closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(subscriber_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    writer.abort();
    state.fanout.unsubscribe(subscriber_id);
    info!(subscriber_id, "Spectator connection closed");
}

/// Forward control events, frames and replies; control is always drained first
async fn write_loop(
    mut subscription: Subscription,
    mut replies: mpsc::Receiver<Bytes>,
    mut ws_sink: SplitSink<WebSocket, Message>,
) {
    let subscriber_id = subscription.id;

    loop {
        let next = tokio::select! {
            biased;
            Some(control) = subscription.control.recv() => control,
            Some(reply) = replies.recv() => reply,
            frame = subscription.frames.recv() => match frame {
                Some(frame) => frame,
                None => {
                    // Dropped by the fan-out; flush remaining control events
                    while let Ok(control) = subscription.control.try_recv() {
                        if send_bytes(&mut ws_sink, control).await.is_err() {
                            break;
                        }
                    }
                    debug!(subscriber_id, "Frame channel closed");
                    break;
                }
            },
        };

        if let Err(e) = send_bytes(&mut ws_sink, next).await {
            debug!(subscriber_id, error = %e, "WebSocket send failed");
            break;
        }
    }

    let _ = ws_sink.close().await;
}

/// Send a pre-encoded JSON message
async fn send_bytes(sink: &mut SplitSink<WebSocket, Message>, json: Bytes) -> Result<(), String> {
    let text = String::from_utf8(json.to_vec()).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text)).await.map_err(|e| e.to_string())
}
