pub mod live_state;

pub use live_state::{LiveStateDoc, SegmentDoc};
