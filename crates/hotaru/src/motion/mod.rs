//! Motion detection over successive compressed frames
//!
//! The detector keeps a copy of the last frame it saw and compares the next
//! one against it. Only two frames matter at any time: whether frame `k`
//! triggers depends on frames `k-1` and `k` alone.

mod comparator;

pub use comparator::{ByteSampler, FrameComparator};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::MotionError;

/// Tunables for the default detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    /// Compare every Nth byte
    pub stride: usize,
    /// Per-sample change that counts as different
    pub pixel_delta: u8,
    /// Changed fraction above which a sample triggers
    pub trigger_fraction: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            stride: 50,
            pixel_delta: 15,
            trigger_fraction: 0.05,
        }
    }
}

/// Result of observing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub changed_fraction: f32,
    pub triggered: bool,
}

impl MotionSample {
    /// Sample returned when there was nothing to compare against.
    pub fn baseline() -> Self {
        Self {
            changed_fraction: 0.0,
            triggered: false,
        }
    }
}

/// Detector shared by every viewer of one capture pipeline.
pub type SharedDetector = Arc<Mutex<MotionDetector>>;

/// Copies a frame into memory the detector owns.
type CopyFn = fn(&[u8]) -> Result<Vec<u8>, MotionError>;

pub struct MotionDetector<C = ByteSampler> {
    comparator: C,
    trigger_fraction: f32,
    retained: Option<Vec<u8>>,
    copy: CopyFn,
}

impl MotionDetector<ByteSampler> {
    pub fn new(config: MotionConfig) -> Self {
        let sampler = ByteSampler {
            stride: config.stride,
            delta: config.pixel_delta,
        };
        Self::with_comparator(sampler, config.trigger_fraction)
    }

    pub fn shared(config: MotionConfig) -> SharedDetector {
        Arc::new(Mutex::new(Self::new(config)))
    }
}

impl<C: FrameComparator> MotionDetector<C> {
    pub fn with_comparator(comparator: C, trigger_fraction: f32) -> Self {
        Self {
            comparator,
            trigger_fraction,
            retained: None,
            copy: copy_frame,
        }
    }

    #[cfg(test)]
    fn with_copy(mut self, copy: CopyFn) -> Self {
        self.copy = copy;
        self
    }

    /// Compare `frame` with the previous one and retain it for next time.
    ///
    /// The first frame, and any frame whose length differs from the
    /// previous one, only establishes a new baseline and never triggers.
    /// On allocation failure the previous baseline is kept as is.
    pub fn observe(&mut self, frame: &[u8]) -> Result<MotionSample, MotionError> {
        if let Some(previous) = self.retained.as_mut().filter(|p| p.len() == frame.len()) {
            let changed_fraction = self.comparator.changed_fraction(previous, frame);
            previous.copy_from_slice(frame);
            return Ok(MotionSample {
                changed_fraction,
                triggered: changed_fraction > self.trigger_fraction,
            });
        }

        self.retained = Some((self.copy)(frame)?);
        Ok(MotionSample::baseline())
    }

    /// Forget the retained frame. The next observation starts a new baseline.
    pub fn reset(&mut self) {
        self.retained = None;
    }

    /// Length of the retained frame, if any.
    pub fn retained_len(&self) -> Option<usize> {
        self.retained.as_ref().map(Vec::len)
    }
}

fn copy_frame(frame: &[u8]) -> Result<Vec<u8>, MotionError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(frame.len())
        .map_err(|_| MotionError::Allocation {
            requested: frame.len(),
        })?;
    buffer.extend_from_slice(frame);
    Ok(buffer)
}
