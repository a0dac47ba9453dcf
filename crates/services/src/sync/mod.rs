pub mod wire;

use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use sereno_db::models::LiveStateDoc;
use sereno_db::store::LiveStateStore;
use sereno_transcription::{SegmentAccumulator, TranscriptSegment};

pub use wire::SyncMessage;

/// Point-in-time copy of the caption state.
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    pub segments: Vec<TranscriptSegment>,
    pub current_partial: String,
    pub is_live: bool,
}

/// Holds the authoritative caption state and pushes every change down both
/// sync channels: the in-process broadcast feed the viewer sockets subscribe
/// to, and the persisted singleton document remote instances watch.
///
/// Local fan-out is synchronous and lossless for connected subscribers;
/// persistence is fire-and-forget, so a store outage degrades remote sync
/// without stalling captions.
pub struct StateBroadcaster {
    inner: Mutex<Inner>,
    feed: broadcast::Sender<String>,
    store: LiveStateStore,
    writer_id: String,
}

struct Inner {
    accumulator: SegmentAccumulator,
    is_live: bool,
    last_error: Option<String>,
}

const FEED_CAPACITY: usize = 64;

impl StateBroadcaster {
    pub fn new(store: LiveStateStore) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                accumulator: SegmentAccumulator::new(),
                is_live: false,
                last_error: None,
            }),
            feed,
            store,
            writer_id: Uuid::new_v4().to_string(),
        }
    }

    /// Identifies this instance's writes in the persisted document.
    pub fn writer_id(&self) -> &str {
        &self.writer_id
    }

    /// Subscribes to the serialized sync feed. Slow subscribers that overflow
    /// the channel miss intermediate snapshots, never the latest one.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.feed.subscribe()
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let inner = self.inner.lock().expect("state lock poisoned");
        LiveSnapshot {
            segments: inner.accumulator.segments().to_vec(),
            current_partial: inner.accumulator.current_partial().to_string(),
            is_live: inner.is_live,
        }
    }

    /// Applies one transcription event from the live session and syncs.
    pub fn apply_transcript(&self, text: &str, is_final: bool) {
        let snapshot = {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            inner.accumulator.apply(text, is_final);
            snapshot_of(&inner)
        };
        self.publish(&snapshot, true);
    }

    pub fn set_live(&self, is_live: bool) {
        let snapshot = {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            inner.is_live = is_live;
            snapshot_of(&inner)
        };
        self.publish(&snapshot, true);
    }

    /// Most recent session error, kept for the operator until explicitly
    /// cleared. Operator-local status; never replicated to viewers.
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("state lock poisoned")
            .last_error
            .clone()
    }

    pub fn set_error(&self, message: &str) {
        self.inner.lock().expect("state lock poisoned").last_error = Some(message.to_string());
    }

    pub fn clear_error(&self) {
        self.inner.lock().expect("state lock poisoned").last_error = None;
    }

    /// Wipes segments and partial. The live flag is left as-is.
    pub fn clear(&self) {
        let snapshot = {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            inner.accumulator.clear();
            snapshot_of(&inner)
        };
        self.publish(&snapshot, true);
    }

    /// Loads persisted state into memory at startup so captions survive a
    /// server restart. Does not publish; nobody is subscribed yet.
    pub fn restore(&self, doc: &LiveStateDoc) {
        let snapshot = wire::hydrate(doc);
        let mut inner = self.inner.lock().expect("state lock poisoned");
        inner
            .accumulator
            .restore(snapshot.segments, snapshot.current_partial);
        inner.is_live = snapshot.is_live;
        debug!(
            segments = inner.accumulator.segments().len(),
            is_live = inner.is_live,
            "Restored persisted caption state"
        );
    }

    /// Adopts a snapshot written by another instance and re-fans it to local
    /// viewers. Not persisted again, so replication cannot loop.
    pub fn adopt_remote(&self, doc: &LiveStateDoc) {
        let snapshot = wire::hydrate(doc);
        {
            let mut inner = self.inner.lock().expect("state lock poisoned");
            inner
                .accumulator
                .restore(snapshot.segments.clone(), snapshot.current_partial.clone());
            inner.is_live = snapshot.is_live;
        }
        self.publish(&snapshot, false);
    }

    fn publish(&self, snapshot: &LiveSnapshot, persist: bool) {
        match serde_json::to_string(&SyncMessage::from_snapshot(snapshot)) {
            Ok(serialized) => {
                // send only fails when no viewer is connected.
                let _ = self.feed.send(serialized);
            }
            Err(e) => warn!(%e, "Failed to serialize sync message"),
        }

        if persist {
            let doc = wire::dehydrate(snapshot, &self.writer_id);
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.save(&doc).await {
                    warn!(%e, "Remote sync write failed; captions continue locally");
                }
            });
        }
    }
}

fn snapshot_of(inner: &Inner) -> LiveSnapshot {
    LiveSnapshot {
        segments: inner.accumulator.segments().to_vec(),
        current_partial: inner.accumulator.current_partial().to_string(),
        is_live: inner.is_live,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Client construction is lazy, so no mongod is needed; spawned persist
    // attempts just log a warning.
    async fn test_broadcaster() -> StateBroadcaster {
        let client = mongodb::Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        let store = LiveStateStore::new(&client.database("sereno_test"));
        StateBroadcaster::new(store)
    }

    #[tokio::test]
    async fn test_transcript_event_fans_out_sync_message() {
        let broadcaster = test_broadcaster().await;
        let mut feed = broadcaster.subscribe();

        broadcaster.apply_transcript("Bom dia", false);

        let message = feed.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(json["type"], "SYNC");
        assert_eq!(json["payload"]["currentPartial"], "Bom dia");
        assert_eq!(json["payload"]["isLive"], false);
    }

    #[tokio::test]
    async fn test_live_flag_fans_out() {
        let broadcaster = test_broadcaster().await;
        let mut feed = broadcaster.subscribe();

        broadcaster.set_live(true);

        let message = feed.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(json["payload"]["isLive"], true);
    }

    #[tokio::test]
    async fn test_adopt_remote_updates_state_and_refans() {
        let broadcaster = test_broadcaster().await;
        let remote = LiveSnapshot {
            segments: Vec::new(),
            current_partial: "de outro servidor".to_string(),
            is_live: true,
        };
        let doc = wire::dehydrate(&remote, "other-writer");

        let mut feed = broadcaster.subscribe();
        broadcaster.adopt_remote(&doc);

        let message = feed.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(json["payload"]["currentPartial"], "de outro servidor");

        let snapshot = broadcaster.snapshot();
        assert_eq!(snapshot.current_partial, "de outro servidor");
        assert!(snapshot.is_live);
    }

    #[tokio::test]
    async fn test_last_error_is_operator_local() {
        let broadcaster = test_broadcaster().await;
        let mut feed = broadcaster.subscribe();

        broadcaster.set_error("Erro na conexão com a IA.");
        assert_eq!(
            broadcaster.last_error().as_deref(),
            Some("Erro na conexão com a IA.")
        );
        // Errors are status, not caption state: nothing fans out.
        assert!(feed.try_recv().is_err());

        broadcaster.clear_error();
        assert!(broadcaster.last_error().is_none());
    }

    #[tokio::test]
    async fn test_clear_empties_segments_but_not_live_flag() {
        let broadcaster = test_broadcaster().await;
        broadcaster.set_live(true);
        broadcaster.apply_transcript("um", true);
        broadcaster.apply_transcript("dois", true);

        broadcaster.clear();

        let snapshot = broadcaster.snapshot();
        assert!(snapshot.segments.is_empty());
        assert_eq!(snapshot.current_partial, "");
        assert!(snapshot.is_live);
    }
}
