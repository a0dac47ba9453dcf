use bson::DateTime;
use serde::{Deserialize, Serialize};

/// The singleton persisted caption state.
///
/// One document per deployment, keyed by a well-known `_id`. The broadcaster
/// replaces it on every state change; late-joining viewers read it once and
/// then follow the change stream. Last write wins — there is no optimistic
/// concurrency check, and the design assumes a single active broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStateDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub segments: Vec<SegmentDoc>,
    #[serde(default)]
    pub current_partial: String,
    #[serde(default)]
    pub is_live: bool,
    /// Identifies the server instance that wrote this revision, so a
    /// change-stream subscriber can skip its own writes.
    #[serde(default)]
    pub writer_id: String,
    pub updated_at: DateTime,
}

impl LiveStateDoc {
    pub const COLLECTION: &'static str = "live_state";
    pub const SINGLETON_ID: &'static str = "live";
}

/// One finalized transcript segment as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDoc {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime,
    pub is_final: bool,
}
