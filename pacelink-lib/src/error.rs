use crate::mode::Mode;
use crate::parameters::Parameter;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `pacelink` library.
#[derive(Error, Debug)]
pub enum PacerError {
    #[error("No serial device could be opened. Is the pacemaker connected?")]
    DeviceNotFound,

    #[error("Device not connected")]
    NotConnected,

    #[error("No pacing mode selected")]
    NoModeSelected,

    #[error("Missing parameters for mode {mode}: {missing:?}")]
    MissingParameters { mode: Mode, missing: Vec<Parameter> },

    #[error("Lower Rate Limit ({lower}) cannot be greater than Upper Rate Limit ({upper})")]
    RateLimitsInverted { lower: f64, upper: f64 },

    #[error("Malformed frame: expected at least {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("No echo received within {0:?}")]
    EchoTimeout(Duration),

    #[error("Serial I/O error: {0}")]
    PortIo(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Parameter store error: {0}")]
    Store(String),
}

impl PacerError {
    /// Whether this error means the physical link is gone and must be rediscovered.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, PacerError::PortIo(_) | PacerError::Serial(_))
    }
}

impl From<serde_json::Error> for PacerError {
    fn from(e: serde_json::Error) -> Self {
        PacerError::Store(e.to_string())
    }
}
