//! One viewer's multipart stream
//!
//! A session negotiates the content type with its sink, then loops:
//! acquire a frame, run motion detection, release the frame, write the
//! part. It ends when the client goes away, capture fails or the device
//! shuts down. The buffer is back in the pool before the client is written
//! to, so a viewer that stops reading holds no capture buffer.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::framing::{self, CONTENT_TYPE};
use super::throughput::{Rate, ThroughputTracker};
use crate::pipeline::Pipeline;
use crate::{CaptureError, FrameLease, StreamError};

/// Where a session's chunks go.
#[async_trait]
pub trait ChunkSink: Send {
    /// Announce the response content type. Called once, before any write.
    async fn start(&mut self, content_type: &'static str) -> Result<(), StreamError>;

    /// Deliver one chunk. Waits while the client is slow.
    async fn write(&mut self, chunk: Bytes) -> Result<(), StreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Streaming,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client disconnected or a write failed
    ClientGone,
    /// The frame source could not deliver
    CaptureFailed(CaptureError),
    /// The device is shutting down
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Frames whose motion sample triggered
    pub motion_events: u64,
    pub rate: Rate,
}

pub struct StreamSession {
    id: u64,
    state: SessionState,
    throughput: ThroughputTracker,
    motion_events: u64,
}

enum PartResult {
    Sent(usize),
    ClientGone,
    Stopped,
}

impl StreamSession {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Negotiating,
            throughput: ThroughputTracker::new(Duration::from_secs(3)),
            motion_events: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stream frames from `pipeline` into `sink` until the session ends.
    pub async fn run(&mut self, pipeline: &Pipeline, sink: &mut dyn ChunkSink) -> SessionReport {
        let _viewer = pipeline.telemetry().stream_opened();
        info!(session = self.id, "Stream opened");

        let outcome = match sink.start(CONTENT_TYPE).await {
            Ok(()) => {
                self.state = SessionState::Streaming;
                self.stream(pipeline, sink).await
            }
            Err(_) => SessionOutcome::ClientGone,
        };
        self.state = SessionState::Closed;

        let report = SessionReport {
            outcome,
            frames_sent: self.throughput.total_frames(),
            bytes_sent: self.throughput.total_bytes(),
            motion_events: self.motion_events,
            rate: self.throughput.rate(),
        };
        info!(
            session = self.id,
            frames = report.frames_sent,
            bytes = report.bytes_sent,
            "Stream closed: {:?}",
            report.outcome
        );
        report
    }

    async fn stream(&mut self, pipeline: &Pipeline, sink: &mut dyn ChunkSink) -> SessionOutcome {
        let shutdown = pipeline.shutdown();
        loop {
            let acquired = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionOutcome::Stopped,
                result = FrameLease::acquire(pipeline.source()) => result,
            };
            let lease = match acquired {
                Ok(lease) => lease,
                Err(e) => {
                    pipeline.telemetry().record_capture_failure();
                    warn!(session = self.id, error = %e, "Capture failed");
                    return SessionOutcome::CaptureFailed(e);
                }
            };

            if let Some(sample) = pipeline.process_motion(&lease) {
                if sample.triggered {
                    self.motion_events += 1;
                }
            }

            let payload = lease.data.clone();
            let sequence = lease.sequence;
            lease.release();

            let result = self.send_part(pipeline, sink, &payload).await;

            match result {
                PartResult::Sent(bytes) => {
                    self.throughput.record_frame(bytes);
                    debug!(session = self.id, sequence, bytes, "Frame sent");
                }
                PartResult::ClientGone => return SessionOutcome::ClientGone,
                PartResult::Stopped => return SessionOutcome::Stopped,
            }
        }
    }

    async fn send_part(
        &self,
        pipeline: &Pipeline,
        sink: &mut dyn ChunkSink,
        payload: &Bytes,
    ) -> PartResult {
        let mut sent = 0;
        for chunk in framing::frame_part(payload) {
            let len = chunk.len();
            let written = tokio::select! {
                biased;
                _ = pipeline.shutdown().cancelled() => return PartResult::Stopped,
                result = sink.write(chunk) => result,
            };
            if written.is_err() {
                return PartResult::ClientGone;
            }
            sent += len;
        }
        PartResult::Sent(sent)
    }
}
