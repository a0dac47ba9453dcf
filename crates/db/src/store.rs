use bson::doc;
use mongodb::change_stream::ChangeStream;
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::options::FullDocumentType;
use mongodb::{Collection, Database};
use tracing::debug;

use crate::error::DbError;
use crate::models::LiveStateDoc;

/// Access to the singleton live-state document.
#[derive(Clone)]
pub struct LiveStateStore {
    col: Collection<LiveStateDoc>,
}

impl LiveStateStore {
    pub fn new(db: &Database) -> Self {
        Self {
            col: db.collection(LiveStateDoc::COLLECTION),
        }
    }

    /// Loads the persisted snapshot, if any exists yet.
    pub async fn load(&self) -> Result<Option<LiveStateDoc>, DbError> {
        let doc = self
            .col
            .find_one(doc! { "_id": LiveStateDoc::SINGLETON_ID })
            .await?;
        Ok(doc)
    }

    /// Replaces the singleton document, creating it on first write.
    pub async fn save(&self, state: &LiveStateDoc) -> Result<(), DbError> {
        self.col
            .replace_one(doc! { "_id": LiveStateDoc::SINGLETON_ID }, state)
            .upsert(true)
            .await?;
        debug!(
            segments = state.segments.len(),
            is_live = state.is_live,
            "Live state persisted"
        );
        Ok(())
    }

    /// Opens a change stream over the singleton document.
    ///
    /// Each event carries the full replacement document (not a delta), which
    /// matches the replication model: viewers apply whole snapshots,
    /// last write wins.
    pub async fn watch(
        &self,
    ) -> Result<ChangeStream<ChangeStreamEvent<LiveStateDoc>>, DbError> {
        let stream = self
            .col
            .watch()
            .pipeline([doc! {
                "$match": { "fullDocument._id": LiveStateDoc::SINGLETON_ID }
            }])
            .full_document(FullDocumentType::UpdateLookup)
            .await?;
        Ok(stream)
    }
}
