//! Service configuration file for `heizwire listen`.
//!
//! ```json
//! {
//!   "serial_port": { "location": "/dev/ttyUSB0", "baud_rate": 57600 },
//!   "pipeline": { "terminator": ";22;1;%;", "max_message_size": 16384, "minimum_read_size": 750 }
//! }
//! ```
//!
//! Every field is optional in the file; `--port` and `--baud` override it.

use std::path::{Path, PathBuf};

use heizwire_frame::{FrameConfig, Terminator, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_TERMINATOR};
use heizwire_pipeline::{
    pipe::{DEFAULT_PAUSE_WRITER_THRESHOLD, DEFAULT_RESUME_WRITER_THRESHOLD},
    PipeOptions, SessionConfig, DEFAULT_MINIMUM_READ_SIZE,
};
use heizwire_transport::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};

use crate::exit::{frame_error, pipeline_error, CliError, CliResult, DATA_INVALID};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub serial_port: SerialPortSection,
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialPortSection {
    pub location: Option<PathBuf>,
    pub baud_rate: u32,
}

impl Default for SerialPortSection {
    fn default() -> Self {
        Self {
            location: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub terminator: String,
    pub max_message_size: usize,
    pub minimum_read_size: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            terminator: String::from_utf8_lossy(DEFAULT_TERMINATOR).into_owned(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            minimum_read_size: DEFAULT_MINIMUM_READ_SIZE,
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("cannot read config {}: {err}", path.display()),
            )
        })?;
        Self::from_json(&text).map_err(|err| {
            CliError::new(err.code, format!("{}: {}", path.display(), err.message))
        })
    }

    pub fn from_json(text: &str) -> CliResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid config: {err}")))
    }

    /// Command-line values win over the file.
    pub fn apply_overrides(&mut self, port: Option<PathBuf>, baud_rate: Option<u32>) {
        if let Some(port) = port {
            self.serial_port.location = Some(port);
        }
        if let Some(baud_rate) = baud_rate {
            self.serial_port.baud_rate = baud_rate;
        }
    }

    /// Device location and baud rate, both required to be usable.
    pub fn serial_settings(&self) -> CliResult<(PathBuf, u32)> {
        let location = match &self.serial_port.location {
            Some(location) if !location.as_os_str().is_empty() => location.clone(),
            _ => {
                return Err(CliError::new(
                    DATA_INVALID,
                    "serial_port.location is required (set it in the config file, --port or HEIZWIRE_PORT)",
                ))
            }
        };
        if self.serial_port.baud_rate == 0 {
            return Err(CliError::new(
                DATA_INVALID,
                "serial_port.baud_rate must be greater than zero",
            ));
        }
        Ok((location, self.serial_port.baud_rate))
    }

    pub fn session_config(&self) -> CliResult<SessionConfig> {
        let section = &self.pipeline;
        let terminator = Terminator::new(section.terminator.clone().into_bytes())
            .map_err(|err| frame_error("pipeline.terminator", err))?;

        session_config(
            FrameConfig {
                terminator,
                max_message_size: section.max_message_size,
            },
            section.minimum_read_size,
        )
    }
}

/// Build a validated session config, widening the pipe limits when the
/// message cap outgrows the default resume threshold.
pub fn session_config(frame: FrameConfig, minimum_read_size: usize) -> CliResult<SessionConfig> {
    let cap = frame.max_message_size;
    let pipe = PipeOptions {
        pause_writer_threshold: DEFAULT_PAUSE_WRITER_THRESHOLD.max(cap.saturating_mul(4)),
        resume_writer_threshold: DEFAULT_RESUME_WRITER_THRESHOLD.max(cap.saturating_mul(2)),
    };
    let config = SessionConfig {
        pipe,
        frame,
        minimum_read_size,
    };
    config
        .validate()
        .map_err(|err| pipeline_error("pipeline", err))?;
    Ok(config)
}
