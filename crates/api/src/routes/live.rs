use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use sereno_services::export::{export_file_name, render_transcript};
use sereno_services::sync::SyncMessage;

use crate::state::AppState;

/// Current caption state in the same shape the WebSocket feed uses, so a
/// viewer can bootstrap over plain HTTP.
pub async fn current(State(state): State<AppState>) -> Json<SyncMessage> {
    Json(SyncMessage::from_snapshot(&state.broadcaster.snapshot()))
}

/// Finalized transcript as a downloadable plain-text file.
pub async fn export(State(state): State<AppState>) -> Response {
    let snapshot = state.broadcaster.snapshot();
    let body = render_transcript(&snapshot.segments);
    let disposition = format!("attachment; filename=\"{}\"", export_file_name(Utc::now()));

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
