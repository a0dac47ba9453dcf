use std::sync::Arc;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sereno_api::{build_router, state::AppState, watch};
use sereno_config::Settings;
use sereno_db::store::LiveStateStore;
use sereno_services::auth::{CredentialCheck, StaticPassphrase};
use sereno_services::broadcast::BroadcastSession;
use sereno_services::sync::StateBroadcaster;
use sereno_transcription::SessionConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sereno=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;

    let db = sereno_db::connect(&settings.mongo.uri, &settings.mongo.database).await?;
    let store = LiveStateStore::new(&db);

    let broadcaster = Arc::new(StateBroadcaster::new(store.clone()));
    if let Some(doc) = store.load().await? {
        broadcaster.restore(&doc);
    }

    let session_config = SessionConfig {
        api_key: settings.gemini.api_key.clone(),
        model: settings.gemini.model.clone(),
        connect_timeout_secs: settings.gemini.connect_timeout_secs,
        frame_samples: settings.audio.frame_samples,
        ..SessionConfig::default()
    };
    let session = Arc::new(BroadcastSession::new(
        session_config,
        Arc::clone(&broadcaster),
    ));

    let credentials: Arc<dyn CredentialCheck> =
        Arc::new(StaticPassphrase::new(settings.broadcast.passphrase.clone()));

    watch::spawn_remote_watch(store, Arc::clone(&broadcaster));

    let app = build_router(AppState {
        broadcaster,
        session,
        credentials,
    });

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Caption server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
