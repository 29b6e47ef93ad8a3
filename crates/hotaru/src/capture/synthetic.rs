//! Synthetic frame source for development without a sensor
//!
//! Produces JPEG-shaped buffers (SOI marker, filler, EOI marker) at a fixed
//! rate. The filler stays byte-identical between frames and shifts every
//! `scene_change_every` frames, which is enough to exercise the motion
//! detector end to end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use super::{BufferPool, CaptureProfile, Pacer};
use crate::{CaptureError, Frame, FrameSource};

/// Configuration for the synthetic source
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Frames per second
    pub fps: u32,
    /// Size of each frame in bytes
    pub frame_size: usize,
    /// Number of frame buffers
    pub buffers: usize,
    /// How long to wait for a free buffer
    pub acquire_timeout: Duration,
    /// Shift the scene every N frames (0 = never)
    pub scene_change_every: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            frame_size: 12_000,
            buffers: 2,
            acquire_timeout: Duration::from_secs(5),
            scene_change_every: 50,
        }
    }
}

impl SyntheticConfig {
    /// Size frames and buffers after a capture profile.
    pub fn for_profile(profile: &CaptureProfile, fps: u32) -> Self {
        Self {
            fps,
            frame_size: profile.estimated_frame_bytes(),
            buffers: profile.frame_buffers,
            ..Default::default()
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    pool: BufferPool,
    pacer: Pacer,
    next_sequence: AtomicU64,
    started: Instant,
}

impl SyntheticSource {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: SyntheticConfig) -> Self {
        info!(
            "Synthetic source: {}fps, {}B frames, {} buffers",
            config.fps, config.frame_size, config.buffers
        );
        Self {
            pool: BufferPool::new(config.buffers),
            pacer: Pacer::new(config.fps),
            next_sequence: AtomicU64::new(0),
            started: Instant::now(),
            config,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

/// Build one synthetic frame for `scene`.
fn render(frame_size: usize, scene: u64) -> Bytes {
    let size = frame_size.max(4);
    let shift = if scene % 2 == 0 { 0u8 } else { 96u8 };

    let mut data = Vec::with_capacity(size);
    data.extend_from_slice(&[0xFF, 0xD8]);
    for i in 0..size - 4 {
        data.push((i as u8).wrapping_mul(31).wrapping_add(shift));
    }
    data.extend_from_slice(&[0xFF, 0xD9]);
    Bytes::from(data)
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn acquire(&self) -> Result<Frame, CaptureError> {
        self.pacer.wait().await;
        self.pool.checkout(self.config.acquire_timeout).await?;

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let scene = match self.config.scene_change_every {
            0 => 0,
            every => sequence / every,
        };
        if sequence > 0 && sequence % 300 == 0 {
            debug!("Synthetic source: {} frames generated", sequence);
        }

        let timestamp_us = self.started.elapsed().as_micros() as u64;
        Ok(Frame::new(render(self.config.frame_size, scene), sequence, timestamp_us))
    }

    fn release(&self, _frame: Frame) {
        self.pool.checkin();
    }
}
