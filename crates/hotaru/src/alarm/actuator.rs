//! Alarm outputs (LED, buzzer)

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// A binary output driven by the alarm.
pub trait Actuator: Send + Sync {
    fn drive(&self, on: bool) -> Result<()>;

    fn name(&self) -> &str;
}

/// Output that only logs, for boards without wired pins.
pub struct LogActuator {
    name: String,
}

impl LogActuator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Actuator for LogActuator {
    fn drive(&self, on: bool) -> Result<()> {
        debug!(actuator = %self.name, on, "Actuator");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Linux sysfs GPIO, driven through its `value` file.
///
/// The pin must already be exported and configured as an output.
pub struct SysfsGpio {
    name: String,
    value_path: PathBuf,
}

impl SysfsGpio {
    pub fn new(name: impl Into<String>, value_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            value_path: value_path.into(),
        }
    }
}

impl Actuator for SysfsGpio {
    fn drive(&self, on: bool) -> Result<()> {
        fs::write(&self.value_path, if on { "1" } else { "0" })
            .with_context(|| format!("Failed to write {:?}", self.value_path))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Drives several outputs together. A failing output does not stop the rest.
pub struct ActuatorBank {
    outputs: Vec<Box<dyn Actuator>>,
}

impl ActuatorBank {
    pub fn new(outputs: Vec<Box<dyn Actuator>>) -> Self {
        Self { outputs }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl Actuator for ActuatorBank {
    fn drive(&self, on: bool) -> Result<()> {
        let mut failed = 0;
        for output in &self.outputs {
            if let Err(e) = output.drive(on) {
                warn!(actuator = output.name(), "Actuator write failed: {:#}", e);
                failed += 1;
            }
        }
        if failed > 0 {
            anyhow::bail!("{} of {} outputs failed", failed, self.outputs.len());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "bank"
    }
}
