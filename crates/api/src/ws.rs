use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sereno_services::sync::SyncMessage;

use crate::state::AppState;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One viewer connection: an initial full snapshot, then every sync message
/// as it is published. Viewers never send state upstream.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%connection_id, "Viewer connected");

    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.broadcaster.subscribe();

    // Late joiners see the full transcript immediately, not just deltas.
    let snapshot = SyncMessage::from_snapshot(&state.broadcaster.snapshot());
    let Ok(initial) = serde_json::to_string(&snapshot) else {
        return;
    };
    if sender.send(Message::text(initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = feed.recv() => match update {
                Ok(serialized) => {
                    if sender.send(Message::text(serialized)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Snapshots supersede each other, so resync with the
                    // latest instead of replaying what was missed.
                    debug!(%connection_id, skipped, "Viewer lagged, resyncing");
                    let snapshot = SyncMessage::from_snapshot(&state.broadcaster.snapshot());
                    let Ok(serialized) = serde_json::to_string(&snapshot) else {
                        break;
                    };
                    if sender.send(Message::text(serialized)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    let _ = sender.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%connection_id, %e, "Viewer socket error");
                    break;
                }
            },
        }
    }

    info!(%connection_id, "Viewer disconnected");
}
