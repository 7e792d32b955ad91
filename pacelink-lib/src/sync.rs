//! Frame boundary detection on the headerless serial stream.
//!
//! Bytes are appended with [`Synchronizer::feed`] as they arrive and complete
//! frames are pulled with [`Synchronizer::next_frame`]. The scanner keeps no
//! state besides the unconsumed bytes, so it can be called again whenever more
//! input shows up.
//!
//! Resynchronization rule: when the first byte of a two-byte prologue is
//! followed by anything other than the second byte, only the first byte is
//! dropped. The byte after it is rescanned, so a stray byte costs at most one
//! byte of search progress.

use crate::frame::FrameKind;
use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

/// A complete frame cut out of the stream, prologue included
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub kind: FrameKind,
    pub bytes: Bytes,
}

/// A recognized frame start: one or two marker bytes, then a fixed payload
#[derive(Debug, Clone, PartialEq)]
pub struct Prologue {
    pub kind: FrameKind,
    pub marker: &'static [u8],
    pub payload_len: usize,
}

impl From<FrameKind> for Prologue {
    fn from(kind: FrameKind) -> Self {
        Self {
            kind,
            marker: kind.prologue(),
            payload_len: kind.payload_len(),
        }
    }
}

impl Prologue {
    fn frame_len(&self) -> usize {
        self.marker.len() + self.payload_len
    }
}

enum Scan {
    /// A full frame of this many bytes starts at the head of the buffer
    Frame(FrameKind, usize),
    /// The head may start a frame but more bytes are needed
    Wait,
    /// The head byte cannot start a frame
    Drop,
}

#[derive(Debug)]
pub struct Synchronizer {
    prologues: Vec<Prologue>,
    buffer: BytesMut,
    discarded: u64,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(vec![FrameKind::Echo.into(), FrameKind::Telemetry.into()])
    }
}

impl Synchronizer {
    pub fn new(prologues: Vec<Prologue>) -> Self {
        debug_assert!(prologues.iter().all(|p| (1..=2).contains(&p.marker.len())));
        Self {
            prologues,
            buffer: BytesMut::with_capacity(512),
            discarded: 0,
        }
    }

    /// Append bytes read from the link
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed by a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes dropped while searching for a prologue
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Forget buffered bytes, e.g. after the link was reopened
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Pull the next complete frame, or `None` if the buffered bytes do not
    /// hold one yet.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            match self.scan_head()? {
                Scan::Frame(kind, len) => {
                    let bytes = self.buffer.split_to(len).freeze();
                    return Some(RawFrame { kind, bytes });
                }
                Scan::Wait => return None,
                Scan::Drop => {
                    let byte = self.buffer[0];
                    self.buffer.advance(1);
                    self.discarded += 1;
                    debug!("Dropped unrecognized byte {:#04x} while resyncing", byte);
                }
            }
        }
    }

    /// Every frame currently extractable
    pub fn drain_frames(&mut self) -> Vec<RawFrame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    fn scan_head(&self) -> Option<Scan> {
        let first = *self.buffer.first()?;
        let mut candidate = false;

        for prologue in &self.prologues {
            if prologue.marker[0] != first {
                continue;
            }
            if prologue.marker.len() == 2 {
                match self.buffer.get(1) {
                    // cannot tell yet whether this is a frame start
                    None => {
                        candidate = true;
                        continue;
                    }
                    Some(&second) if second != prologue.marker[1] => continue,
                    Some(_) => {}
                }
            }
            if self.buffer.len() >= prologue.frame_len() {
                return Some(Scan::Frame(prologue.kind, prologue.frame_len()));
            }
            candidate = true;
        }

        Some(if candidate { Scan::Wait } else { Scan::Drop })
    }
}
