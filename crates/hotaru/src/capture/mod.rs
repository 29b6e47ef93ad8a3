//! Frame sources
//!
//! The camera driver itself lives outside this crate. What ships here:
//! - A bounded frame-buffer pool shared by all sources
//! - A synthetic source for development without a sensor
//! - A replay source that cycles through recorded JPEGs
//! - Start-up selection of the capture profile from available memory

pub mod pool;
pub mod replay;
pub mod resources;
pub mod synthetic;

pub use pool::{BufferPool, PoolStats};
pub use replay::ReplaySource;
pub use resources::{available_memory_bytes, CaptureProfile, MemoryTier};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Paces frame production to a fixed rate across all callers.
pub(crate) struct Pacer {
    interval: Mutex<Interval>,
}

impl Pacer {
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(fps: u32) -> Self {
        let period = Duration::from_micros(1_000_000 / fps.max(1) as u64);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Mutex::new(interval),
        }
    }

    pub(crate) async fn wait(&self) {
        self.interval.lock().await.tick().await;
    }
}
