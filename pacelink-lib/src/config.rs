use crate::constants::{
    BAUD_RATE, DEFAULT_ECHO_TIMEOUT, DEFAULT_OPEN_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_SINK_CAPACITY,
};
use crate::error::PacerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Link session settings.
///
/// Deserializes from JSON; every field is optional and falls back to the
/// protocol defaults.
///
/// ```json
/// { "port_name": "/dev/ttyACM0", "echo_timeout_ms": 1500, "sink_capacity": 2000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub baud_rate: u32,
    pub open_timeout_ms: u64,
    pub echo_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub sink_capacity: usize,
    /// Only consider ports with this USB vendor id
    pub vendor_id: Option<u16>,
    /// Only consider ports with this USB product id
    pub product_id: Option<u16>,
    /// Only consider the port with this name
    pub port_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT.as_millis() as u64,
            echo_timeout_ms: DEFAULT_ECHO_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            vendor_id: None,
            product_id: None,
            port_name: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, PacerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PacerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PacerError::Store(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn with_port(mut self, name: impl Into<String>) -> Self {
        self.port_name = Some(name.into());
        self
    }

    pub fn with_usb_id(mut self, vid: u16, pid: u16) -> Self {
        self.vendor_id = Some(vid);
        self.product_id = Some(pid);
        self
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    /// Receive loop period; never zero
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
