//! Control request parsing
//!
//! Malformed requests are rejected before anything is touched. Names and
//! commands this device does not know are accepted and ignored, so newer
//! front ends keep working against older firmware.

use bytes::Bytes;
use serde::Deserialize;

use crate::alarm::AlarmCommand;
use crate::CommandError;

/// A parsed `GET /control?var=&val=` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    MotionDetect(bool),
    Alarm(bool),
    Unknown { var: String },
}

impl ControlCommand {
    pub fn parse(var: Option<&str>, val: Option<&str>) -> Result<Self, CommandError> {
        let var = var.ok_or(CommandError::MissingParam("var"))?;
        let val = val.ok_or(CommandError::MissingParam("val"))?;
        let value: i64 = val.trim().parse().map_err(|_| CommandError::InvalidValue {
            var: var.to_string(),
            value: val.to_string(),
        })?;
        let on = value != 0;

        Ok(match var {
            "motion_detect" => ControlCommand::MotionDetect(on),
            "alarm" => ControlCommand::Alarm(on),
            other => ControlCommand::Unknown {
                var: other.to_string(),
            },
        })
    }
}

/// Body of `POST /alarm`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmRequest {
    pub command: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl AlarmRequest {
    pub fn from_body(body: &Bytes) -> Result<Self, CommandError> {
        serde_json::from_slice(body).map_err(|e| CommandError::MalformedBody(e.to_string()))
    }

    /// `None` if the command is not one this device knows.
    pub fn command(&self) -> Option<AlarmCommand> {
        AlarmCommand::parse(&self.command)
    }
}
