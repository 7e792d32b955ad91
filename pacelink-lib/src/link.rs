use crate::config::SessionConfig;
use crate::error::PacerError;
use serde::Serialize;
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// The physical byte pipe to the device.
///
/// All calls must return promptly: `read` is only issued for bytes that
/// `bytes_available` reported as already buffered.
pub trait Link: Send {
    fn name(&self) -> &str;

    /// Bytes already received and waiting to be read
    fn bytes_available(&mut self) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Discard pending input and output
    fn clear(&mut self) -> io::Result<()>;
}

/// A serial port opened through the `serialport` crate
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialLink {
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, PacerError> {
        let port = serialport::new(name, baud_rate).timeout(timeout).open()?;
        Ok(Self {
            port,
            name: name.to_string(),
        })
    }
}

impl Link for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn clear(&mut self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::All)?)
    }
}

/// What the OS reports about a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub port_type: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let (port_type, vid, pid, serial_number, manufacturer, product) = match p.port_type {
            SerialPortType::UsbPort(info) => (
                "USB".to_string(),
                Some(info.vid),
                Some(info.pid),
                info.serial_number,
                info.manufacturer,
                info.product,
            ),
            SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None, None, None, None),
            SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
            SerialPortType::Unknown => ("Unknown".to_string(), None, None, None, None, None),
        };
        PortInfo {
            name: p.port_name,
            port_type,
            vid,
            pid,
            serial_number,
            manufacturer,
            product,
        }
    }
}

impl PortInfo {
    /// A port known only by name
    pub fn named(name: impl Into<String>) -> Self {
        PortInfo {
            name: name.into(),
            port_type: "Unknown".to_string(),
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Whether the configured port name and USB id filters accept this port
    pub fn matches(&self, config: &SessionConfig) -> bool {
        if let Some(name) = &config.port_name {
            if &self.name != name {
                return false;
            }
        }
        if let Some(vid) = config.vendor_id {
            if self.vid != Some(vid) {
                return false;
            }
        }
        if let Some(pid) = config.product_id {
            if self.pid != Some(pid) {
                return false;
            }
        }
        true
    }

    /// Whether `other` is the same physical device as this port
    pub fn same_device(&self, other: &PortInfo) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.serial_number, &other.serial_number) {
            (Some(a), Some(b)) => a == b,
            _ => self.vid == other.vid && self.pid == other.pid,
        }
    }

    /// Short label for logs: serial number if the port has one, else its name
    pub fn label(&self) -> String {
        match (&self.serial_number, self.vid, self.pid) {
            (Some(serial), _, _) => format!("{} (serial {})", self.name, serial),
            (None, Some(vid), Some(pid)) => format!("{} ({:04x}:{:04x})", self.name, vid, pid),
            _ => self.name.clone(),
        }
    }
}

/// List serial ports.
///
/// On macOS only the `/dev/cu.*` devices are kept; the `/dev/tty.*` twins
/// block on open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<PortInfo>, PacerError> {
    let ports = serialport::available_ports()?;
    debug!("Enumerated {} serial port(s)", ports.len());
    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(PortInfo::from)
        .collect())
}

/// Ports worth trying, in enumeration order
pub fn candidate_ports(ports: Vec<PortInfo>, config: &SessionConfig) -> Vec<PortInfo> {
    ports.into_iter().filter(|p| p.matches(config)).collect()
}

/// Open the first candidate that accepts the configured baud rate.
pub fn open_first(candidates: &[PortInfo], config: &SessionConfig) -> Option<(SerialLink, PortInfo)> {
    for port in candidates {
        match SerialLink::open(&port.name, config.baud_rate, config.open_timeout()) {
            Ok(link) => return Some((link, port.clone())),
            Err(e) => warn!("Failed to open {}: {}", port.name, e),
        }
    }
    None
}
