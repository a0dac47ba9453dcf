use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::info;

use sereno_transcription::AudioSource;

use crate::{error::ApiError, state::AppState};

/// Carries the broadcaster passphrase on every control request.
pub const BROADCAST_KEY_HEADER: &str = "x-broadcast-key";

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub source: AudioSource,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub is_live: bool,
    /// Most recent session error, if any; cleared on a successful start.
    pub last_error: Option<String>,
}

async fn status_of(state: &AppState) -> StatusResponse {
    StatusResponse {
        is_live: state.session.is_live().await,
        last_error: state.broadcaster.last_error(),
    }
}

pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    authorize(&state, &headers)?;
    state.session.start(body.source).await?;
    info!(source = ?body.source, "Broadcast start requested");
    Ok(Json(status_of(&state).await))
}

pub async fn stop(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    authorize(&state, &headers)?;
    state.session.stop().await;
    Ok(Json(status_of(&state).await))
}

pub async fn clear(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    authorize(&state, &headers)?;
    state.session.clear();
    Ok(Json(status_of(&state).await))
}

/// Broadcaster status poll; how the operator sees mid-session errors that
/// happen between control requests.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(status_of(&state).await))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let key = headers
        .get(BROADCAST_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !state.credentials.verify(key) {
        return Err(ApiError::Unauthorized(
            "Broadcaster credentials required".to_string(),
        ));
    }
    Ok(())
}
