//! Frame type and the frame source seam

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::CaptureError;

/// One compressed still image (JPEG) as handed out by a [`FrameSource`].
///
/// The payload is opaque: nothing in this crate decodes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Compressed image bytes
    pub data: Bytes,
    /// Capture sequence number, per source
    pub sequence: u64,
    /// Capture time in microseconds since the source started
    pub timestamp_us: u64,
}

impl Frame {
    pub fn new(data: Bytes, sequence: u64, timestamp_us: u64) -> Self {
        Self {
            data,
            sequence,
            timestamp_us,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Something that yields frames from a small, finite buffer pool.
///
/// Every successful [`acquire`](FrameSource::acquire) must be paired with
/// exactly one [`release`](FrameSource::release); with as few as one buffer,
/// a leaked frame stalls capture for everyone. Prefer [`FrameLease`], which
/// makes the pairing automatic.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Wait for the next frame.
    async fn acquire(&self) -> Result<Frame, CaptureError>;

    /// Hand a frame's buffer back to the source.
    fn release(&self, frame: Frame);
}

/// A checked-out frame that returns itself to its source when dropped.
pub struct FrameLease {
    frame: Frame,
    source: Arc<dyn FrameSource>,
}

impl FrameLease {
    /// Acquire a frame from `source`.
    pub async fn acquire(source: &Arc<dyn FrameSource>) -> Result<Self, CaptureError> {
        let frame = source.acquire().await?;
        Ok(Self {
            frame,
            source: Arc::clone(source),
        })
    }

    /// Release the frame now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for FrameLease {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        let frame = std::mem::take(&mut self.frame);
        self.source.release(frame);
    }
}
