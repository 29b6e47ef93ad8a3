//! Replay source: serves recorded JPEG frames as if they came off a sensor.
//!
//! Frames come either from memory or from the `.jpg`/`.jpeg` files of a
//! directory (sorted by name). Replay loops by default; `once()` makes the
//! source report `Closed` after the last frame.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use super::{BufferPool, Pacer};
use crate::{CaptureError, Frame, FrameSource};

pub struct ReplaySource {
    frames: Vec<Bytes>,
    looped: bool,
    cursor: AtomicU64,
    pool: BufferPool,
    pacer: Option<Pacer>,
    acquire_timeout: Duration,
    started: Instant,
}

impl ReplaySource {
    /// Replay `frames` in order, looping, unpaced, with a single buffer.
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self {
            frames,
            looped: true,
            cursor: AtomicU64::new(0),
            pool: BufferPool::new(1),
            pacer: None,
            acquire_timeout: Duration::from_secs(5),
            started: Instant::now(),
        }
    }

    /// Load every `.jpg`/`.jpeg` file in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {:?}", dir))?
        {
            let path = entry?.path();
            let is_jpeg = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false);
            if is_jpeg && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            anyhow::bail!("No .jpg files found in {:?}", dir);
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
            frames.push(Bytes::from(data));
        }

        info!("Replay source: loaded {} frames from {:?}", frames.len(), dir);
        Ok(Self::new(frames))
    }

    /// Stop after the last frame instead of looping.
    pub fn once(mut self) -> Self {
        self.looped = false;
        self
    }

    /// Use `buffers` frame buffers.
    pub fn with_buffers(mut self, buffers: usize) -> Self {
        self.pool = BufferPool::new(buffers);
        self
    }

    /// Pace output to `fps`. Must be called from within a Tokio runtime.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.pacer = Some(Pacer::new(fps));
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn exhausted(&self, position: u64) -> bool {
        !self.looped && position >= self.frames.len() as u64
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn acquire(&self) -> Result<Frame, CaptureError> {
        if self.frames.is_empty() || self.exhausted(self.cursor.load(Ordering::SeqCst)) {
            return Err(CaptureError::Closed);
        }
        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }
        self.pool.checkout(self.acquire_timeout).await?;

        let sequence = self.cursor.fetch_add(1, Ordering::SeqCst);
        if self.exhausted(sequence) {
            self.pool.checkin();
            return Err(CaptureError::Closed);
        }

        let data = self.frames[(sequence % self.frames.len() as u64) as usize].clone();
        let timestamp_us = self.started.elapsed().as_micros() as u64;
        Ok(Frame::new(data, sequence, timestamp_us))
    }

    fn release(&self, _frame: Frame) {
        self.pool.checkin();
    }
}
