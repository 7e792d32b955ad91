use crate::config::SessionConfig;
use crate::constants::READ_CHUNK_SIZE;
use crate::error::PacerError;
use crate::frame::{self, EchoFrame, InboundFrame};
use crate::link::{self, Link, PortInfo};
use crate::mode::Mode;
use crate::parameters::ParameterSet;
use crate::sink::SampleSink;
use crate::sync::Synchronizer;
use bytes::Bytes;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Where the link currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Idle,
    /// A parameter frame went out and its echo has not arrived yet
    AwaitingEcho { mode: Mode },
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        !matches!(self, LinkState::Disconnected)
    }
}

/// Outcome of a presence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Connected and the device is still enumerated
    Present,
    /// Was connected, but the device disappeared; the session is now disconnected
    Lost(PortInfo),
    /// Disconnected, and a candidate port is enumerated
    Available(PortInfo),
    /// Disconnected, and nothing to connect to
    Absent,
}

/// What a single receive step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub bytes_read: usize,
    pub frames: usize,
    pub samples: usize,
    pub echoes: usize,
    /// Line noise: bytes dropped while looking for a frame start
    pub discarded: u64,
    pub echo_timed_out: bool,
}

/// A parameter frame that went out, with a handle on its echo
#[derive(Debug)]
pub struct Transmission {
    pub mode: Mode,
    pub frame: Bytes,
    seq: u64,
    echo: oneshot::Receiver<EchoFrame>,
}

struct PendingEcho {
    seq: u64,
    mode: Mode,
    sent_at: Instant,
    reply: oneshot::Sender<EchoFrame>,
}

struct Inner {
    link: Option<Box<dyn Link>>,
    port: Option<PortInfo>,
    state: LinkState,
    sync: Synchronizer,
    pending: Option<PendingEcho>,
    sends: u64,
}

impl Inner {
    fn close(&mut self) -> Option<String> {
        let name = self.link.take().map(|l| l.name().to_string());
        self.port = None;
        self.state = LinkState::Disconnected;
        self.pending = None;
        self.sync.reset();
        name
    }

    fn read_available(&mut self) -> io::Result<usize> {
        let Inner { link, sync, .. } = self;
        let Some(link) = link.as_mut() else {
            return Ok(0);
        };

        // only what is already buffered, so this never blocks on the port
        let mut remaining = link.bytes_available()?;
        let mut total = 0;
        let mut buf = [0u8; READ_CHUNK_SIZE];
        while remaining > 0 {
            let want = remaining.min(READ_CHUNK_SIZE);
            let got = link.read(&mut buf[..want])?;
            if got == 0 {
                break;
            }
            sync.feed(&buf[..got]);
            total += got;
            remaining = remaining.saturating_sub(got);
        }
        Ok(total)
    }
}

/// The single link session to the device.
///
/// Cheap to clone; every clone shares the same link. The transport lock
/// serializes writes and reads against each other, while the sample sink is
/// guarded separately so that draining it never waits on serial I/O.
#[derive(Clone)]
pub struct Session {
    config: Arc<SessionConfig>,
    inner: Arc<Mutex<Inner>>,
    sink: Arc<SampleSink>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let sink = Arc::new(SampleSink::new(config.sink_capacity));
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                link: None,
                port: None,
                state: LinkState::Disconnected,
                sync: Synchronizer::default(),
                pending: None,
                sends: 0,
            })),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> Arc<SampleSink> {
        self.sink.clone()
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The enumerated port behind the open link, if it came from discovery
    pub fn port(&self) -> Option<PortInfo> {
        self.lock().port.clone()
    }

    pub fn port_name(&self) -> Option<String> {
        self.lock().link.as_ref().map(|l| l.name().to_string())
    }

    /// Discover and open the device. Returns whether the session is connected
    /// afterwards; an already open link is kept.
    pub fn connect(&self) -> bool {
        match self.try_connect() {
            Ok(_) => true,
            Err(e) => {
                debug!("Connect failed: {}", e);
                false
            }
        }
    }

    /// Like [`Session::connect`], reporting why nothing could be opened
    pub fn try_connect(&self) -> Result<Option<PortInfo>, PacerError> {
        {
            let inner = self.lock();
            if inner.link.is_some() {
                return Ok(inner.port.clone());
            }
        }

        let candidates = link::candidate_ports(link::list_ports()?, &self.config);
        if candidates.is_empty() {
            return Err(PacerError::DeviceNotFound);
        }
        // opening may take a while, so not under the transport lock
        let (serial, port) = link::open_first(&candidates, &self.config).ok_or(PacerError::DeviceNotFound)?;

        let mut inner = self.lock();
        if inner.link.is_some() {
            debug!("Another caller connected first, dropping {}", port.name);
            return Ok(inner.port.clone());
        }
        info!("Connected to {} at {} baud", port.label(), self.config.baud_rate);
        inner.link = Some(Box::new(serial));
        inner.port = Some(port.clone());
        inner.state = LinkState::Idle;
        inner.sync.reset();
        Ok(Some(port))
    }

    /// Take over an already open link, replacing any current one
    pub fn attach(&self, link: Box<dyn Link>, port: Option<PortInfo>) {
        let mut inner = self.lock();
        if let Some(old) = inner.close() {
            info!("Replacing link {}", old);
        }
        info!("Attached link {}", link.name());
        inner.link = Some(link);
        inner.port = port;
        inner.state = LinkState::Idle;
    }

    /// Close the link. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        if let Some(name) = self.lock().close() {
            info!("Disconnected from {}", name);
        }
    }

    fn fail(&self, inner: &mut Inner, e: io::Error) -> PacerError {
        if let Some(name) = inner.close() {
            warn!("Link failure on {}: {}", name, e);
        }
        PacerError::PortIo(e)
    }

    /// Encode and write one parameter frame.
    ///
    /// Pending input is discarded before the write, so the next frame of the
    /// mode's kind that arrives is the device's answer. A newer send
    /// supersedes the echo wait of an older one.
    pub fn send(&self, mode: Mode, parameters: &ParameterSet) -> Result<Transmission, PacerError> {
        let frame = frame::encode(mode, parameters);
        let mut inner = self.lock();
        let Some(link) = inner.link.as_mut() else {
            return Err(PacerError::NotConnected);
        };

        let port = link.name().to_string();
        let written = link
            .clear()
            .and_then(|_| link.write_all(&frame))
            .and_then(|_| link.flush());
        if let Err(e) = written {
            return Err(self.fail(&mut inner, e));
        }

        debug!("Serial Write: {}", hex::encode(&frame));
        info!("Sent {} parameter frame ({} bytes) to {}", mode, frame.len(), port);

        let (reply, echo) = oneshot::channel();
        inner.sends += 1;
        let seq = inner.sends;
        inner.sync.reset();
        inner.pending = Some(PendingEcho {
            seq,
            mode,
            sent_at: Instant::now(),
            reply,
        });
        inner.state = LinkState::AwaitingEcho { mode };

        Ok(Transmission { mode, frame, seq, echo })
    }

    /// Read whatever is buffered, cut it into frames and route them.
    ///
    /// Telemetry goes into the sink, an echo matching the pending send
    /// completes it. Frames that fail to decode are dropped.
    pub fn receive_step(&self) -> Result<StepReport, PacerError> {
        let mut inner = self.lock();
        if inner.link.is_none() {
            return Err(PacerError::NotConnected);
        }

        let mut report = StepReport::default();
        report.bytes_read = match inner.read_available() {
            Ok(n) => n,
            Err(e) => return Err(self.fail(&mut inner, e)),
        };
        if report.bytes_read > 0 {
            debug!("Serial Read: {} bytes", report.bytes_read);
        }

        let discarded_before = inner.sync.discarded();
        for raw in inner.sync.drain_frames() {
            report.frames += 1;
            match InboundFrame::decode(raw.kind, &raw.bytes) {
                Ok(InboundFrame::Telemetry(t)) => {
                    self.sink.push(t.latest());
                    report.samples += 1;
                }
                Ok(InboundFrame::Echo(echo)) => {
                    if Self::complete_echo(&mut inner, echo) {
                        report.echoes += 1;
                    }
                }
                Err(e) => debug!("Discarding {:?} frame: {}", raw.kind, e),
            }
        }

        report.discarded = inner.sync.discarded() - discarded_before;
        report.echo_timed_out = self.expire_echo(&mut inner);
        Ok(report)
    }

    fn complete_echo(inner: &mut Inner, echo: EchoFrame) -> bool {
        let expected = inner.pending.as_ref().map(|p| p.mode);
        if expected.is_none() || echo.mode() != expected {
            debug!("Ignoring echo for mode code {} ({})", echo.mode_code, hex::encode(&echo.raw));
            return false;
        }
        let Some(pending) = inner.pending.take() else {
            return false;
        };
        info!("Echo received for {} after {:?}", pending.mode, pending.sent_at.elapsed());
        // the sender may have stopped waiting
        let _ = pending.reply.send(echo);
        inner.state = LinkState::Idle;
        true
    }

    fn expire_echo(&self, inner: &mut Inner) -> bool {
        let timeout = self.config.echo_timeout();
        match &inner.pending {
            Some(p) if p.sent_at.elapsed() >= timeout => {
                warn!("No echo for {} within {:?}", p.mode, timeout);
                inner.pending = None;
                inner.state = LinkState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Wait for the echo of `sent`, up to the configured echo timeout.
    ///
    /// Someone must be driving [`Session::receive_step`] meanwhile, normally a
    /// running [`crate::Receiver`]. A timeout returns the link to idle; it is
    /// not a link failure.
    pub async fn await_echo(&self, sent: Transmission) -> Result<EchoFrame, PacerError> {
        let timeout = self.config.echo_timeout();
        match tokio::time::timeout(timeout, sent.echo).await {
            Ok(Ok(echo)) => Ok(echo),
            // reply dropped: superseded, expired or the link closed
            Ok(Err(_)) => {
                if self.is_connected() {
                    Err(PacerError::EchoTimeout(timeout))
                } else {
                    Err(PacerError::NotConnected)
                }
            }
            Err(_) => {
                let mut inner = self.lock();
                // a newer send may own the wait by now
                if inner.pending.as_ref().is_some_and(|p| p.seq == sent.seq) {
                    warn!("No echo for {} within {:?}", sent.mode, timeout);
                    inner.pending = None;
                    inner.state = LinkState::Idle;
                }
                Err(PacerError::EchoTimeout(timeout))
            }
        }
    }

    /// Check that the device is still enumerated, or whether one showed up.
    ///
    /// A connected session whose port vanished is disconnected here.
    pub fn check_presence(&self) -> Result<Presence, PacerError> {
        let ports = link::list_ports()?;
        Ok(self.presence_among(&ports))
    }

    /// [`Session::check_presence`] against an already enumerated port list
    pub fn presence_among(&self, ports: &[PortInfo]) -> Presence {
        let mut inner = self.lock();
        if inner.link.is_some() {
            let Some(current) = inner.port.clone() else {
                // attached by hand, nothing to compare against
                return Presence::Present;
            };
            if ports.iter().any(|p| p.same_device(&current)) {
                return Presence::Present;
            }
            warn!("Device on {} is gone", current.label());
            inner.close();
            return Presence::Lost(current);
        }
        drop(inner);

        match ports.iter().find(|p| p.matches(&self.config)) {
            Some(port) => Presence::Available(port.clone()),
            None => Presence::Absent,
        }
    }
}
