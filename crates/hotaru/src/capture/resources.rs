//! Start-up capture profile selection
//!
//! Memory is probed once when the device boots. Boards with plenty of free
//! memory get a smaller frame at higher quality with double buffering;
//! tight boards fall back to a single buffer.

use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::{debug, info};

const MEMINFO_PATH: &str = "/proc/meminfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTier {
    Ample,
    Constrained,
}

impl FromStr for MemoryTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ample" => Ok(MemoryTier::Ample),
            "constrained" => Ok(MemoryTier::Constrained),
            other => anyhow::bail!("Unknown memory tier: {}", other),
        }
    }
}

/// Resolution, quality and buffering chosen for the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureProfile {
    pub tier: MemoryTier,
    pub width: u32,
    pub height: u32,
    /// JPEG quality, lower is better (0-63)
    pub jpeg_quality: u8,
    pub frame_buffers: usize,
}

impl CaptureProfile {
    pub fn for_tier(tier: MemoryTier) -> Self {
        match tier {
            MemoryTier::Ample => Self {
                tier,
                width: 640,
                height: 480,
                jpeg_quality: 10,
                frame_buffers: 2,
            },
            MemoryTier::Constrained => Self {
                tier,
                width: 800,
                height: 600,
                jpeg_quality: 12,
                frame_buffers: 1,
            },
        }
    }

    /// Pick a profile from the available memory. Unknown memory counts as
    /// constrained.
    pub fn select(available_bytes: Option<u64>, ample_threshold_bytes: u64) -> Self {
        let tier = match available_bytes {
            Some(bytes) if bytes >= ample_threshold_bytes => MemoryTier::Ample,
            _ => MemoryTier::Constrained,
        };
        let profile = Self::for_tier(tier);
        info!(
            "Capture profile: {:?} {}x{} q{} ({} buffers)",
            profile.tier, profile.width, profile.height, profile.jpeg_quality, profile.frame_buffers
        );
        profile
    }

    /// Rough compressed frame size: 24bpp scaled down by the quality index.
    pub fn estimated_frame_bytes(&self) -> usize {
        let raw = self.width as usize * self.height as usize * 3;
        raw / (self.jpeg_quality.max(1) as usize * 8)
    }
}

/// Available system memory in bytes, if it can be read.
pub fn available_memory_bytes() -> Option<u64> {
    match read_available_memory() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            debug!("Available memory unknown: {:#}", e);
            None
        }
    }
}

fn read_available_memory() -> Result<u64> {
    let content = fs::read_to_string(MEMINFO_PATH).context("Failed to read /proc/meminfo")?;
    parse_available(&content)
}

fn parse_available(meminfo: &str) -> Result<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("MemAvailable:"))
        .context("No MemAvailable line")?;
    let kib = parse_meminfo_value(line)?;
    Ok(kib.saturating_mul(1024))
}

fn parse_meminfo_value(line: &str) -> Result<u64> {
    let value = line
        .split_whitespace()
        .nth(1)
        .context("Invalid meminfo line")?;
    value.parse().context("Invalid meminfo value")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:        3884232 kB\n\
                           MemFree:          201648 kB\n\
                           MemAvailable:    2254236 kB\n\
                           Buffers:          123456 kB\n";

    #[test]
    fn parses_mem_available() {
        assert_eq!(parse_available(MEMINFO).unwrap(), 2_254_236 * 1024);
    }

    #[test]
    fn missing_mem_available_is_an_error() {
        assert!(parse_available("MemTotal: 100 kB\n").is_err());
        assert!(parse_available("MemAvailable: lots kB\n").is_err());
    }

    #[test]
    fn ample_memory_selects_double_buffering() {
        let profile = CaptureProfile::select(Some(128 << 20), 64 << 20);
        assert_eq!(profile.tier, MemoryTier::Ample);
        assert_eq!((profile.width, profile.height), (640, 480));
        assert_eq!(profile.jpeg_quality, 10);
        assert_eq!(profile.frame_buffers, 2);
    }

    #[test]
    fn tight_or_unknown_memory_selects_single_buffer() {
        let tight = CaptureProfile::select(Some(8 << 20), 64 << 20);
        assert_eq!(tight.tier, MemoryTier::Constrained);
        assert_eq!(tight.frame_buffers, 1);
        assert_eq!(tight.jpeg_quality, 12);

        let unknown = CaptureProfile::select(None, 64 << 20);
        assert_eq!(unknown.tier, MemoryTier::Constrained);
    }

    #[test]
    fn threshold_is_inclusive() {
        let profile = CaptureProfile::select(Some(64 << 20), 64 << 20);
        assert_eq!(profile.tier, MemoryTier::Ample);
    }

    #[test]
    fn estimated_sizes() {
        assert_eq!(CaptureProfile::for_tier(MemoryTier::Ample).estimated_frame_bytes(), 11_520);
        assert_eq!(
            CaptureProfile::for_tier(MemoryTier::Constrained).estimated_frame_bytes(),
            15_000
        );
    }

    #[test]
    fn tier_names_parse() {
        assert_eq!("ample".parse::<MemoryTier>().unwrap(), MemoryTier::Ample);
        assert_eq!(" Constrained ".parse::<MemoryTier>().unwrap(), MemoryTier::Constrained);
        assert!("huge".parse::<MemoryTier>().is_err());
    }
}
