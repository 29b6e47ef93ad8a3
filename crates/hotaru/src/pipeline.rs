//! The capture pipeline handle
//!
//! Bundles the frame source, the one motion detector fed by every viewer,
//! the alarm, the telemetry and the shutdown token. Stream sessions and
//! HTTP handlers each hold a clone.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alarm::AlarmController;
use crate::motion::{MotionSample, SharedDetector};
use crate::telemetry::SharedTelemetry;
use crate::{CaptureError, Frame, FrameLease, FrameSource};

#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn FrameSource>,
    detector: SharedDetector,
    alarm: AlarmController,
    telemetry: SharedTelemetry,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: SharedDetector,
        alarm: AlarmController,
        telemetry: SharedTelemetry,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            detector,
            alarm,
            telemetry,
            shutdown,
        }
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    pub fn alarm(&self) -> &AlarmController {
        &self.alarm
    }

    pub fn telemetry(&self) -> &SharedTelemetry {
        &self.telemetry
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Run motion detection on `frame` if it is enabled.
    ///
    /// Returns `None` when detection is off or the detector could not keep
    /// a copy of the frame; either way the frame is still streamed.
    pub fn process_motion(&self, frame: &Frame) -> Option<MotionSample> {
        let result = {
            // The flag is read under the detector lock so a frame cannot be
            // retained after `set_detection(false)` has reset the detector.
            let mut detector = self.detector.lock();
            if !self.telemetry.detection_enabled() {
                return None;
            }
            detector.observe(&frame.data)
        };
        match result {
            Ok(sample) => {
                self.telemetry.record_sample(&sample);
                if sample.triggered {
                    debug!(
                        sequence = frame.sequence,
                        changed = sample.changed_fraction,
                        "Motion detected"
                    );
                    self.alarm.on_motion(&sample, Instant::now());
                }
                Some(sample)
            }
            Err(e) => {
                warn!(sequence = frame.sequence, "Skipping motion detection: {}", e);
                None
            }
        }
    }

    /// Switch motion detection on or off. Turning it off drops the retained
    /// frame so re-enabling starts from a fresh baseline.
    pub fn set_detection(&self, enabled: bool) {
        let mut detector = self.detector.lock();
        if !enabled {
            detector.reset();
        }
        self.telemetry.set_detection_enabled(enabled);
        drop(detector);
        info!(enabled, "Motion detection");
    }

    /// One acquire/release cycle, returning a copy of the frame bytes.
    pub async fn capture_jpeg(&self) -> Result<Bytes, CaptureError> {
        match FrameLease::acquire(&self.source).await {
            Ok(lease) => Ok(lease.data.clone()),
            Err(e) => {
                self.telemetry.record_capture_failure();
                Err(e)
            }
        }
    }
}
