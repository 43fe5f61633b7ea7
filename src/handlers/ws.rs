//! Axum WebSocket handler
//!
//! The handler is a thin bridge: it owns the socket, the session
//! coordinator owns everything else. Inbound frames are forwarded on a
//! channel, and a writer task drains the coordinator's routed output back
//! onto the socket, so the coordinator never touches axum types.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::core::session::{
    InboundFrame, MessageRoute, SessionCoordinator, StreamConfig,
};
use crate::state::AppState;

/// Optimized channel buffer size for audio workloads
/// Larger buffer (1024 vs default 256) reduces contention in high-throughput scenarios
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// WebSocket voice processing handler
/// Upgrades the HTTP connection to WebSocket for real-time voice processing
pub async fn ws_voice_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket voice connection upgrade requested");
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state))
}

/// Bridge one WebSocket connection onto a session coordinator.
async fn handle_voice_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let session = SessionCoordinator::new(
        StreamConfig::default(),
        app_state.config.session_limits(),
        app_state.collaborators.clone(),
    );
    info!(session_id = %session.id(), "WebSocket voice connection established");

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundFrame>(CHANNEL_BUFFER_SIZE);
    let (transport_tx, mut transport_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    let session_task = tokio::spawn(session.clone().run(inbound_rx, transport_tx));

    // Writer task: the only place that touches the socket's send half.
    let sender_task = tokio::spawn(async move {
        while let Some(route) = transport_rx.recv().await {
            let result = match route {
                MessageRoute::Outbound(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Binary(data) => sender.send(Message::Binary(data)).await,
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    // Reader: forward raw frames, the coordinator does the parsing.
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if inbound_tx
                    .send(InboundFrame::Text(text.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                if inbound_tx.send(InboundFrame::Binary(data)).await.is_err() {
                    break;
                }
            }
            // axum answers protocol pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session.id(), "WebSocket connection closed by client");
                break;
            }
            Err(e) => {
                warn!(session_id = %session.id(), "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Dropping our sender is the disconnect signal the coordinator waits on.
    drop(inbound_tx);

    match session_task.await {
        Ok(Err(e)) => error!(session_id = %session.id(), error = %e, "session ended with fatal fault"),
        Err(join_error) => error!(session_id = %session.id(), %join_error, "session task failed"),
        Ok(Ok(())) => {}
    }
    let _ = sender_task.await;

    info!(session_id = %session.id(), "WebSocket voice connection terminated");
}
