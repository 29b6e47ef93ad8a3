//! Hotaru - a small camera appliance
//!
//! Captures compressed JPEG frames, streams them to browsers as
//! `multipart/x-mixed-replace`, watches successive frames for motion and
//! drives a pulsing LED/buzzer alarm. Feature flags control which modules
//! are compiled:
//!
//! - **Core** (always available): frames and sources, motion detection,
//!   alarm controller, shared telemetry, the multipart stream session
//! - **`web`** (default): axum HTTP surface (`/`, `/stream`, `/capture`,
//!   `/control`, `/alarm`, `/status`)

mod error;
mod frame;

pub mod alarm;
pub mod capture;
pub mod config;
pub mod motion;
pub mod pipeline;
pub mod stream;
pub mod telemetry;

#[cfg(feature = "web")]
pub mod web;

pub use error::{CaptureError, CommandError, MotionError, StreamError};
pub use frame::{Frame, FrameLease, FrameSource};
pub use pipeline::Pipeline;
