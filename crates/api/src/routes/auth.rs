use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub passphrase: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub authorized: bool,
}

/// Checks the broadcaster passphrase. The same passphrase is then sent as
/// the `x-broadcast-key` header on every control request.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.credentials.verify(&body.passphrase) {
        return Err(ApiError::Unauthorized("Senha incorreta.".to_string()));
    }
    Ok(Json(LoginResponse { authorized: true }))
}
