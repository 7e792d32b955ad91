//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use pacelink_lib::error::PacerError;
#[allow(unused_imports)]
pub use pacelink_lib::frame::{self, EchoFrame, TelemetryFrame};
#[allow(unused_imports)]
pub use pacelink_lib::link::{Link, PortInfo};
#[allow(unused_imports)]
pub use pacelink_lib::session::{LinkState, Presence, Session};
#[allow(unused_imports)]
pub use pacelink_lib::{Mode, Parameter, ParameterSet, Sample, SessionConfig};

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Wire {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    clears: usize,
    echo_writes: bool,
    broken: bool,
}

/// In-memory stand-in for the serial port.
///
/// Clones share the same wire, so a test keeps one clone to play the device
/// while the session owns the other.
#[derive(Clone)]
#[allow(dead_code)]
pub struct LoopbackLink {
    name: String,
    wire: Arc<Mutex<Wire>>,
}

#[allow(dead_code)]
impl LoopbackLink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wire: Arc::new(Mutex::new(Wire::default())),
        }
    }

    /// A device that reads back every parameter frame it receives
    pub fn echoing(name: &str) -> Self {
        let link = Self::new(name);
        link.wire.lock().unwrap().echo_writes = true;
        link
    }

    /// Queue bytes as if the device had sent them
    pub fn device_sends(&self, data: &[u8]) {
        self.wire.lock().unwrap().inbound.extend(data.iter().copied());
    }

    /// Everything the session wrote so far
    pub fn written(&self) -> Vec<u8> {
        self.wire.lock().unwrap().written.clone()
    }

    pub fn clears(&self) -> usize {
        self.wire.lock().unwrap().clears
    }

    pub fn pending_inbound(&self) -> usize {
        self.wire.lock().unwrap().inbound.len()
    }

    /// Make every further call fail, like an unplugged adapter
    pub fn unplug(&self) {
        self.wire.lock().unwrap().broken = true;
    }

    pub fn boxed(&self) -> Box<dyn Link> {
        Box::new(self.clone())
    }
}

fn unplugged() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged")
}

impl Link for LoopbackLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let wire = self.wire.lock().unwrap();
        if wire.broken {
            return Err(unplugged());
        }
        Ok(wire.inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock().unwrap();
        if wire.broken {
            return Err(unplugged());
        }
        let n = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut wire = self.wire.lock().unwrap();
        if wire.broken {
            return Err(unplugged());
        }
        wire.written.extend_from_slice(data);
        if wire.echo_writes {
            wire.inbound.extend(data.iter().copied());
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.wire.lock().unwrap().broken {
            return Err(unplugged());
        }
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        let mut wire = self.wire.lock().unwrap();
        if wire.broken {
            return Err(unplugged());
        }
        wire.inbound.clear();
        wire.clears += 1;
        Ok(())
    }
}

/// Route library logs to the test output; `RUST_LOG=debug` shows frame hex dumps
#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session settings with short timeouts so tests finish quickly
#[allow(dead_code)]
pub fn fast_config() -> SessionConfig {
    SessionConfig::default()
        .with_echo_timeout(Duration::from_millis(150))
        .with_poll_interval(Duration::from_millis(5))
        .with_sink_capacity(16)
}

/// A session already attached to a fresh loopback link
#[allow(dead_code)]
pub fn attached(link: &LoopbackLink) -> Session {
    init_logging();
    let session = Session::new(fast_config());
    session.attach(link.boxed(), None);
    session
}

/// The AAI programming example: LRL 60, URL 120, atrial amplitude 3.5 V
#[allow(dead_code)]
pub fn aai_parameters() -> ParameterSet {
    ParameterSet::nominal()
        .with(Parameter::LowerRateLimit, 60u32)
        .with(Parameter::UpperRateLimit, 120u32)
        .with(Parameter::AtrialAmplitude, 3.5)
        .restricted_to(Mode::Aai)
}

/// Telemetry frame whose newest pair is (`atrial`, `ventricular`)
#[allow(dead_code)]
pub fn telemetry_bytes(atrial: f32, ventricular: f32) -> Bytes {
    let mut frame = TelemetryFrame {
        atrial: [0.0; 10],
        ventricular: [0.0; 10],
    };
    for i in 0..10 {
        frame.atrial[i] = atrial - (9 - i) as f32;
        frame.ventricular[i] = ventricular - (9 - i) as f32;
    }
    frame::encode_telemetry(&frame)
}
