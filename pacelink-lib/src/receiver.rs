use crate::error::PacerError;
use crate::link::{self, PortInfo};
use crate::session::{Presence, Session};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Why a receive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverExit {
    Stopped,
    /// The session was disconnected under the loop
    Disconnected,
    /// Reading failed; the session has already been reset
    LinkFailed(String),
}

/// Background task that keeps calling [`Session::receive_step`].
///
/// Stop it with [`Receiver::stop`], which waits for the task and then closes
/// the link. Dropping a `Receiver` only asks the task to stop.
pub struct Receiver {
    session: Session,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<ReceiverExit>>,
}

impl Receiver {
    /// Spawn the loop on the current tokio runtime
    pub fn start(session: Session) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(receive_loop(session.clone(), stop.clone()));
        Self {
            session,
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop, wait for it to finish and close the link
    pub async fn stop(mut self) -> ReceiverExit {
        self.stop.store(true, Ordering::SeqCst);
        let exit = match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!("Receive task panicked: {}", e);
                ReceiverExit::Stopped
            }),
            None => ReceiverExit::Stopped,
        };
        self.session.disconnect();
        exit
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

async fn receive_loop(session: Session, stop: Arc<AtomicBool>) -> ReceiverExit {
    let period = session.config().poll_interval();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Receive loop started ({:?} period)", period);

    let exit = loop {
        ticker.tick().await;
        if stop.load(Ordering::SeqCst) {
            break ReceiverExit::Stopped;
        }

        match session.receive_step() {
            Ok(report) => {
                if report.frames > 0 || report.discarded > 0 {
                    trace!(
                        "Step: {} bytes, {} frames, {} samples, {} echoes, {} noise bytes",
                        report.bytes_read, report.frames, report.samples, report.echoes, report.discarded
                    );
                }
            }
            Err(PacerError::NotConnected) => break ReceiverExit::Disconnected,
            Err(e) => {
                error!("Receive loop stopping: {}", e);
                break ReceiverExit::LinkFailed(e.to_string());
            }
        }
    };

    info!("Receive loop terminated: {:?}", exit);
    exit
}

/// Connection events reported by the [`Supervisor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected(PortInfo),
    Lost(PortInfo),
}

/// Keeps a session connected across unplug and replug.
///
/// Each [`Supervisor::tick`] checks device presence: a newly enumerated
/// device is connected and a receive loop started for it, a vanished one has
/// its loop stopped.
pub struct Supervisor {
    session: Session,
    receiver: Option<Receiver>,
}

impl Supervisor {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            receiver: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(Receiver::is_running)
    }

    async fn stop_receiver(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            let exit = receiver.stop().await;
            debug!("Receiver stopped: {:?}", exit);
        }
    }

    fn ensure_receiver(&mut self) {
        if !self.is_receiving() {
            self.receiver = Some(Receiver::start(self.session.clone()));
        }
    }

    /// One presence check. Returns the connection change it caused, if any.
    pub async fn tick(&mut self) -> Result<Option<LinkEvent>, PacerError> {
        let ports = link::list_ports()?;
        self.tick_among(&ports).await
    }

    /// [`Supervisor::tick`] against an already enumerated port list
    pub async fn tick_among(&mut self, ports: &[PortInfo]) -> Result<Option<LinkEvent>, PacerError> {
        // a loop that died on a link failure has already reset the session
        if self.receiver.is_some() && !self.is_receiving() {
            self.stop_receiver().await;
        }

        match self.session.presence_among(ports) {
            Presence::Present => {
                self.ensure_receiver();
                Ok(None)
            }
            Presence::Lost(port) => {
                self.stop_receiver().await;
                Ok(Some(LinkEvent::Lost(port)))
            }
            Presence::Available(_) => match self.session.try_connect() {
                Ok(port) => {
                    self.ensure_receiver();
                    Ok(port.map(LinkEvent::Connected))
                }
                Err(PacerError::DeviceNotFound) => Ok(None),
                Err(e) => Err(e),
            },
            Presence::Absent => Ok(None),
        }
    }

    /// Tick every `period` until `shutdown` resolves, then stop the loop.
    pub async fn run_until<F>(mut self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.tick().await {
                    Ok(Some(LinkEvent::Connected(port))) => info!("Device connected on {}", port.label()),
                    Ok(Some(LinkEvent::Lost(port))) => warn!("Device lost on {}", port.label()),
                    Ok(None) => {}
                    Err(e) => warn!("Presence check failed: {}", e),
                },
            }
        }

        self.shutdown().await;
    }

    /// Stop the receive loop and close the link
    pub async fn shutdown(mut self) {
        self.stop_receiver().await;
        self.session.disconnect();
    }
}
