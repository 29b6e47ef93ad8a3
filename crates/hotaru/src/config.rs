//! Device configuration from `HOTARU_*` environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::alarm::AlarmConfig;
use crate::capture::{CaptureProfile, MemoryTier};
use crate::motion::MotionConfig;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Generated frames, no sensor needed
    Synthetic,
    /// Recorded `.jpg` files from a directory
    Replay(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub web_port: u16,
    pub source: SourceKind,
    pub fps: u32,
    /// Forced tier; `None` probes available memory at startup
    pub tier: Option<MemoryTier>,
    pub ample_memory_bytes: u64,
    pub motion: MotionConfig,
    /// Motion detection state at boot
    pub detection_enabled: bool,
    pub alarm: AlarmConfig,
    pub led_gpio: Option<PathBuf>,
    pub buzzer_gpio: Option<PathBuf>,
    pub acquire_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_lookup(|key| std::env::var(key).ok(), &args)
    }

    /// Build from any variable lookup and argument list.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, args: &[String]) -> Result<Self> {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<f64>().ok());
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v.trim() != "0")
                .unwrap_or(default)
        };

        let web_port: u16 = lookup("HOTARU_WEB_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(80);

        let test_source = args.iter().any(|arg| arg == "--test-source");
        let source = match lookup("HOTARU_SOURCE_DIR") {
            Some(dir) if !test_source && !dir.is_empty() => SourceKind::Replay(PathBuf::from(dir)),
            _ => SourceKind::Synthetic,
        };

        let fps: u32 = lookup("HOTARU_FPS")
            .and_then(|s| s.parse().ok())
            .filter(|&fps| fps > 0)
            .unwrap_or(10);

        let tier = lookup("HOTARU_TIER")
            .map(|s| MemoryTier::from_str(&s))
            .transpose()
            .context("Invalid HOTARU_TIER")?;

        let ample_memory_mb: u64 = lookup("HOTARU_AMPLE_MEMORY_MB")
            .and_then(|s| s.parse().ok())
            .unwrap_or(64);

        let defaults = MotionConfig::default();
        let motion = MotionConfig {
            stride: lookup("HOTARU_MOTION_STRIDE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stride),
            pixel_delta: lookup("HOTARU_MOTION_DELTA")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pixel_delta),
            trigger_fraction: parsed("HOTARU_MOTION_THRESHOLD")
                .map(|f| f as f32)
                .unwrap_or(defaults.trigger_fraction),
        };

        let pulse_ms: u64 = lookup("HOTARU_PULSE_MS")
            .and_then(|s| s.parse().ok())
            .filter(|&ms| ms > 0)
            .unwrap_or(400);
        let alarm = AlarmConfig {
            pulse_interval: Duration::from_millis(pulse_ms),
            trigger_on_motion: flag("HOTARU_ALARM_ON_MOTION", true),
            ..Default::default()
        };

        let acquire_timeout_ms: u64 = lookup("HOTARU_ACQUIRE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);

        Ok(Self {
            web_port,
            source,
            fps,
            tier,
            ample_memory_bytes: ample_memory_mb * 1024 * 1024,
            motion,
            detection_enabled: flag("HOTARU_MOTION_DETECT", true),
            alarm,
            led_gpio: lookup("HOTARU_LED_GPIO").map(PathBuf::from),
            buzzer_gpio: lookup("HOTARU_BUZZER_GPIO").map(PathBuf::from),
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
        })
    }

    /// Resolve the capture profile. Call once at startup.
    pub fn capture_profile(&self, available_bytes: Option<u64>) -> CaptureProfile {
        match self.tier {
            Some(tier) => CaptureProfile::for_tier(tier),
            None => CaptureProfile::select(available_bytes, self.ample_memory_bytes),
        }
    }
}
