//! Per-session delivery rate over a sliding window

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Delivery rate at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rate {
    pub frames_per_second: f64,
    pub bits_per_second: f64,
}

/// Tracks frames and bytes delivered to one viewer.
pub struct ThroughputTracker {
    /// (time, cumulative frames, cumulative bytes)
    samples: VecDeque<(Instant, u64, u64)>,
    window: Duration,
    frames: u64,
    bytes: u64,
}

impl ThroughputTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
            frames: 0,
            bytes: 0,
        }
    }

    /// Record one delivered frame of `bytes` bytes.
    pub fn record_frame(&mut self, bytes: usize) {
        self.record_frame_at(Instant::now(), bytes);
    }

    fn record_frame_at(&mut self, now: Instant, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
        self.samples.push_back((now, self.frames, self.bytes));
        while let Some(&(t, _, _)) = self.samples.front() {
            if now.saturating_duration_since(t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.frames
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes
    }

    /// Rate over the window. Zero until the window spans at least 100ms.
    pub fn rate(&self) -> Rate {
        let (Some(&(t_old, f_old, b_old)), Some(&(t_new, f_new, b_new))) =
            (self.samples.front(), self.samples.back())
        else {
            return Rate::default();
        };

        let elapsed = t_new.saturating_duration_since(t_old);
        if elapsed < Duration::from_millis(100) {
            return Rate::default();
        }

        let secs = elapsed.as_secs_f64();
        Rate {
            frames_per_second: (f_new - f_old) as f64 / secs,
            bits_per_second: (b_new - b_old) as f64 * 8.0 / secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_is_zero() {
        let tracker = ThroughputTracker::new(Duration::from_secs(3));
        assert_eq!(tracker.rate(), Rate::default());
    }

    #[test]
    fn short_span_is_zero() {
        let mut tracker = ThroughputTracker::new(Duration::from_secs(3));
        let start = Instant::now();
        tracker.record_frame_at(start, 1000);
        tracker.record_frame_at(start + Duration::from_millis(50), 1000);
        assert_eq!(tracker.rate(), Rate::default());
        assert_eq!(tracker.total_frames(), 2);
        assert_eq!(tracker.total_bytes(), 2000);
    }

    #[test]
    fn rate_over_window() {
        let mut tracker = ThroughputTracker::new(Duration::from_secs(3));
        let start = Instant::now();
        for i in 0..=10 {
            tracker.record_frame_at(start + Duration::from_millis(100 * i), 12_500);
        }

        // 10 frames and 125kB after the first sample, over one second
        let rate = tracker.rate();
        assert!((rate.frames_per_second - 10.0).abs() < 1e-6);
        assert!((rate.bits_per_second - 1_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn old_samples_fall_out_of_window() {
        let mut tracker = ThroughputTracker::new(Duration::from_millis(300));
        let start = Instant::now();
        tracker.record_frame_at(start, 10_000);
        tracker.record_frame_at(start + Duration::from_millis(150), 10_000);
        tracker.record_frame_at(start + Duration::from_millis(500), 10_000);

        assert_eq!(tracker.samples.len(), 1);
        assert_eq!(tracker.rate(), Rate::default());
        // Totals are not windowed
        assert_eq!(tracker.total_frames(), 3);
    }
}
