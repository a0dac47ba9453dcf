use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sereno_transcription::{
    AudioSource, EventSink, LiveSessionClient, SessionConfig, SessionError,
};

use crate::sync::StateBroadcaster;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("a broadcast is already live")]
    AlreadyLive,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Everything a session reports, as values a task can route.
#[derive(Debug)]
enum SessionEvent {
    Connected,
    Disconnected,
    Error(String),
    Transcription { text: String, is_final: bool },
}

/// Bridges session callbacks onto a channel so the broadcast pump can react
/// from async context.
struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink for ChannelSink {
    fn on_connect(&self) {
        let _ = self.tx.send(SessionEvent::Connected);
    }

    fn on_disconnect(&self) {
        let _ = self.tx.send(SessionEvent::Disconnected);
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(SessionEvent::Error(message.to_string()));
    }

    fn on_transcription_update(&self, text: &str, is_final: bool) {
        let _ = self.tx.send(SessionEvent::Transcription {
            text: text.to_string(),
            is_final,
        });
    }
}

/// The broadcaster role: owns the single live transcription session and
/// feeds its events into the shared state.
///
/// At most one session runs at a time. Starting while live is rejected;
/// stopping is idempotent.
pub struct BroadcastSession {
    session_config: SessionConfig,
    broadcaster: Arc<StateBroadcaster>,
    active: Mutex<Option<ActiveBroadcast>>,
}

struct ActiveBroadcast {
    client: Arc<LiveSessionClient>,
    pump: JoinHandle<()>,
}

impl BroadcastSession {
    pub fn new(session_config: SessionConfig, broadcaster: Arc<StateBroadcaster>) -> Self {
        Self {
            session_config,
            broadcaster,
            active: Mutex::new(None),
        }
    }

    pub async fn is_live(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.pump.is_finished())
    }

    /// Connects, starts streaming the chosen source and flips the shared
    /// live flag. On any failure the partially opened session is torn down
    /// before the error is returned.
    pub async fn start(&self, source: AudioSource) -> Result<(), BroadcastError> {
        let mut active = self.active.lock().await;
        if let Some(existing) = active.as_ref() {
            if !existing.pump.is_finished() {
                return Err(BroadcastError::AlreadyLive);
            }
            // The previous session ended on its own (remote close or
            // transport error); release whatever it still holds.
            if let Some(stale) = active.take() {
                stale.client.disconnect().await;
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let client = LiveSessionClient::new(
            self.session_config.clone(),
            Arc::new(ChannelSink { tx: event_tx }),
        );

        if let Err(e) = client.connect().await {
            self.broadcaster.set_error(&e.to_string());
            return Err(e.into());
        }
        if let Err(e) = client.start_audio_stream(source).await {
            client.disconnect().await;
            self.broadcaster.set_error(&e.to_string());
            return Err(e.into());
        }

        let pump = tokio::spawn(pump_events(event_rx, Arc::clone(&self.broadcaster)));
        // A new session starts from a blank transcript and a clean slate.
        self.broadcaster.clear_error();
        self.broadcaster.clear();
        self.broadcaster.set_live(true);
        info!(?source, "Broadcast started");

        *active = Some(ActiveBroadcast { client, pump });
        Ok(())
    }

    /// Ends the live session. Safe to call when nothing is running.
    pub async fn stop(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };
        active.client.disconnect().await;
        // The pump exits after routing the disconnect notification.
        let _ = active.pump.await;
        info!("Broadcast stopped");
    }

    /// Wipes the transcript for broadcaster and viewers alike. Allowed both
    /// mid-broadcast and after the fact.
    pub fn clear(&self) {
        self.broadcaster.clear();
        info!("Transcript cleared");
    }
}

async fn pump_events(
    mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    broadcaster: Arc<StateBroadcaster>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            SessionEvent::Transcription { text, is_final } => {
                broadcaster.apply_transcript(&text, is_final);
            }
            SessionEvent::Error(message) => {
                warn!(%message, "Live session reported an error");
                broadcaster.set_error(&message);
            }
            SessionEvent::Disconnected => {
                broadcaster.set_live(false);
                break;
            }
            SessionEvent::Connected => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sereno_db::store::LiveStateStore;

    async fn test_broadcaster() -> Arc<StateBroadcaster> {
        let client = mongodb::Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        let store = LiveStateStore::new(&client.database("sereno_test"));
        Arc::new(StateBroadcaster::new(store))
    }

    #[tokio::test]
    async fn test_session_error_surfaces_to_operator_state() {
        let broadcaster = test_broadcaster().await;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_events(event_rx, Arc::clone(&broadcaster)));

        event_tx
            .send(SessionEvent::Error("Erro na conexão com a IA.".to_string()))
            .unwrap();
        event_tx.send(SessionEvent::Disconnected).unwrap();
        pump.await.unwrap();

        assert_eq!(
            broadcaster.last_error().as_deref(),
            Some("Erro na conexão com a IA.")
        );
        assert!(!broadcaster.snapshot().is_live);
    }
}
