pub mod error;
pub mod routes;
pub mod state;
pub mod watch;
pub mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/broadcast/start", post(routes::broadcast::start))
        .route("/api/broadcast/stop", post(routes::broadcast::stop))
        .route("/api/broadcast/clear", post(routes::broadcast::clear))
        .route("/api/broadcast/status", get(routes::broadcast::status))
        .route("/api/state", get(routes::live::current))
        .route("/api/export", get(routes::live::export))
        .route("/api/ws", get(ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
