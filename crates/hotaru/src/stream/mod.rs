//! MJPEG streaming to viewers

pub mod framing;
mod session;
mod throughput;

pub use framing::{BOUNDARY, CONTENT_TYPE};
pub use session::{ChunkSink, SessionOutcome, SessionReport, SessionState, StreamSession};
pub use throughput::{Rate, ThroughputTracker};
