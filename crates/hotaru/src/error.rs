//! Error taxonomy for the capture → detect → stream → control path.
//!
//! Every failure here is contained to the operation that hit it; none of
//! them is fatal to the process.

use std::time::Duration;

use thiserror::Error;

/// The frame source could not hand out a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Every frame buffer stayed checked out for the whole wait
    #[error("no frame buffer became free within {0:?}")]
    Timeout(Duration),
    /// The source has no more frames (replay exhausted, device gone)
    #[error("frame source closed")]
    Closed,
    /// Driver-level failure
    #[error("capture failed: {0}")]
    Device(String),
}

/// The motion detector could not take its baseline copy of a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MotionError {
    #[error("failed to allocate {requested} bytes for the retained frame")]
    Allocation { requested: usize },
}

/// A chunk could not be delivered to the viewer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("client disconnected")]
    Disconnected,
}

/// A control request was malformed. Never changes any state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing query parameter `{0}`")]
    MissingParam(&'static str),
    #[error("invalid value `{value}` for `{var}`")]
    InvalidValue { var: String, value: String },
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}
