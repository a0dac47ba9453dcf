pub mod accumulator;
pub mod audio;
pub mod clean;
pub mod config;
pub mod session;

pub use accumulator::{SegmentAccumulator, TranscriptSegment};
pub use audio::{AudioSource, CaptureError};
pub use clean::clean_transcript;
pub use config::SessionConfig;
pub use session::{EventSink, LiveSessionClient, SessionError, SessionState};
