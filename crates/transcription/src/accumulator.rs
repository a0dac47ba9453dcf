use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One finalized, immutable unit of transcribed speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Unique within one broadcaster session.
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_final: bool,
}

impl TranscriptSegment {
    fn finalized(text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
            is_final: true,
        }
    }
}

/// Folds the session client's partial/final event stream into an append-only
/// segment list plus one mutable partial string.
///
/// Partial events carry cumulative text for the current turn, so they replace
/// the partial wholesale; no history is retained. Final events append a
/// segment and clear the partial. Segments are never mutated after creation.
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    segments: Vec<TranscriptSegment>,
    current_partial: String,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one transcription event in emission order.
    pub fn apply(&mut self, text: &str, is_final: bool) {
        if is_final {
            self.segments.push(TranscriptSegment::finalized(text));
            self.current_partial.clear();
        } else {
            self.current_partial = text.to_string();
        }
    }

    /// Reinstates previously persisted state, replacing whatever is held.
    pub fn restore(&mut self, segments: Vec<TranscriptSegment>, current_partial: String) {
        self.segments = segments;
        self.current_partial = current_partial;
    }

    /// Discards all segments and the partial. The live flag lives elsewhere
    /// and is deliberately untouched.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.current_partial.clear();
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn current_partial(&self) -> &str {
        &self.current_partial
    }
}
