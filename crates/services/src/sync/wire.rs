use bson::DateTime as BsonDateTime;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use sereno_db::models::{LiveStateDoc, SegmentDoc};
use sereno_transcription::TranscriptSegment;

use super::LiveSnapshot;

/// The one message kind viewers receive. Every payload is a whole snapshot;
/// viewers replace their state rather than patching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: SyncPayload,
}

impl SyncMessage {
    pub const KIND: &'static str = "SYNC";

    pub fn from_snapshot(snapshot: &LiveSnapshot) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            payload: SyncPayload {
                segments: snapshot.segments.iter().map(WireSegment::from).collect(),
                current_partial: snapshot.current_partial.clone(),
                is_live: snapshot.is_live,
                timestamp: Utc::now().timestamp_millis(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub segments: Vec<WireSegment>,
    pub current_partial: String,
    pub is_live: bool,
    /// Milliseconds since the epoch at emission time.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSegment {
    pub id: String,
    pub text: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub is_final: bool,
}

impl From<&TranscriptSegment> for WireSegment {
    fn from(seg: &TranscriptSegment) -> Self {
        Self {
            id: seg.id.clone(),
            text: seg.text.clone(),
            timestamp: seg.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            is_final: seg.is_final,
        }
    }
}

/// Converts an in-memory snapshot into the persisted singleton document.
pub fn dehydrate(snapshot: &LiveSnapshot, writer_id: &str) -> LiveStateDoc {
    LiveStateDoc {
        id: LiveStateDoc::SINGLETON_ID.to_string(),
        segments: snapshot
            .segments
            .iter()
            .map(|seg| SegmentDoc {
                id: seg.id.clone(),
                text: seg.text.clone(),
                timestamp: BsonDateTime::from_chrono(seg.created_at),
                is_final: seg.is_final,
            })
            .collect(),
        current_partial: snapshot.current_partial.clone(),
        is_live: snapshot.is_live,
        writer_id: writer_id.to_string(),
        updated_at: BsonDateTime::now(),
    }
}

/// Converts a persisted document back into an in-memory snapshot.
pub fn hydrate(doc: &LiveStateDoc) -> LiveSnapshot {
    LiveSnapshot {
        segments: doc
            .segments
            .iter()
            .map(|seg| TranscriptSegment {
                id: seg.id.clone(),
                text: seg.text.clone(),
                created_at: seg.timestamp.to_chrono(),
                is_final: seg.is_final,
            })
            .collect(),
        current_partial: doc.current_partial.clone(),
        is_live: doc.is_live,
    }
}
