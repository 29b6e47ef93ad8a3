//! Shared device telemetry
//!
//! One lock guards every field, so a reader never sees a count without the
//! timestamp that belongs to it.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::motion::MotionSample;

/// Point-in-time view of the device counters.
///
/// Timestamps are milliseconds since the device started; 0 means never.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub detection_enabled: bool,
    pub motion_count: u64,
    pub last_motion_ms: u64,
    pub alarm_active: bool,
    pub total_alerts: u64,
    /// Free-form status string from the last alarm command
    pub detection_status: String,
    pub last_detection_ms: u64,
    pub capture_failures: u64,
    /// Changed fraction of the most recent comparison
    pub last_change: f32,
    pub active_streams: u32,
}

#[derive(Clone)]
pub struct SharedTelemetry {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<Telemetry>,
    epoch: Instant,
}

impl SharedTelemetry {
    pub fn new(detection_enabled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(Telemetry {
                    detection_enabled,
                    ..Default::default()
                }),
                epoch: Instant::now(),
            }),
        }
    }

    pub fn read(&self) -> Telemetry {
        self.inner.state.lock().clone()
    }

    /// Apply `f` to the telemetry as one atomic update.
    pub fn update<R>(&self, f: impl FnOnce(&mut Telemetry) -> R) -> R {
        let mut state = self.inner.state.lock();
        let before = (state.motion_count, state.total_alerts, state.capture_failures);
        let result = f(&mut *state);
        debug_assert!(
            state.motion_count >= before.0
                && state.total_alerts >= before.1
                && state.capture_failures >= before.2,
            "telemetry counters went backwards"
        );
        result
    }

    pub fn uptime_ms(&self) -> u64 {
        self.inner.epoch.elapsed().as_millis() as u64
    }

    /// Event timestamp. Never 0, which is reserved for "never".
    pub fn now_ms(&self) -> u64 {
        self.uptime_ms().max(1)
    }

    pub fn detection_enabled(&self) -> bool {
        self.inner.state.lock().detection_enabled
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.update(|t| t.detection_enabled = enabled);
    }

    /// Record a motion comparison; triggering samples bump the counter.
    pub fn record_sample(&self, sample: &MotionSample) {
        let now = self.now_ms();
        self.update(|t| {
            t.last_change = sample.changed_fraction;
            if sample.triggered {
                t.motion_count += 1;
                t.last_motion_ms = now;
            }
        });
    }

    pub fn record_capture_failure(&self) {
        self.update(|t| t.capture_failures += 1);
    }

    /// Count a viewer until the returned guard is dropped.
    pub fn stream_opened(&self) -> StreamGuard {
        self.update(|t| t.active_streams += 1);
        StreamGuard {
            telemetry: self.clone(),
        }
    }
}

pub struct StreamGuard {
    telemetry: SharedTelemetry,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.telemetry
            .update(|t| t.active_streams = t.active_streams.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggered_sample_updates_count_and_time_together() {
        let telemetry = SharedTelemetry::new(true);
        telemetry.record_sample(&MotionSample {
            changed_fraction: 0.5,
            triggered: true,
        });

        let t = telemetry.read();
        assert_eq!(t.motion_count, 1);
        assert!(t.last_motion_ms >= 1);
        assert_eq!(t.last_change, 0.5);
    }

    #[test]
    fn quiet_sample_only_updates_last_change() {
        let telemetry = SharedTelemetry::new(true);
        telemetry.record_sample(&MotionSample {
            changed_fraction: 0.01,
            triggered: false,
        });

        let t = telemetry.read();
        assert_eq!(t.motion_count, 0);
        assert_eq!(t.last_motion_ms, 0);
        assert_eq!(t.last_change, 0.01);
    }

    #[test]
    fn detection_flag_round_trips() {
        let telemetry = SharedTelemetry::new(true);
        assert!(telemetry.detection_enabled());
        telemetry.set_detection_enabled(false);
        assert!(!telemetry.read().detection_enabled);
    }

    #[test]
    fn stream_guard_tracks_viewers() {
        let telemetry = SharedTelemetry::new(false);
        let a = telemetry.stream_opened();
        let b = telemetry.stream_opened();
        assert_eq!(telemetry.read().active_streams, 2);
        drop(a);
        assert_eq!(telemetry.read().active_streams, 1);
        drop(b);
        assert_eq!(telemetry.read().active_streams, 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let telemetry = SharedTelemetry::new(true);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let telemetry = telemetry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        telemetry.record_sample(&MotionSample {
                            changed_fraction: 1.0,
                            triggered: true,
                        });
                        telemetry.record_capture_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let t = telemetry.read();
        assert_eq!(t.motion_count, 8000);
        assert_eq!(t.capture_failures, 8000);
    }
}
