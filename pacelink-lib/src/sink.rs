use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One egram sample: the atrial and ventricular channel at the same instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub atrial: f32,
    pub ventricular: f32,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A: {:.4}, V: {:.4}", self.atrial, self.ventricular)
    }
}

/// Bounded ring of the most recent telemetry samples.
///
/// The receive loop pushes, the display drains. `push` never blocks on the
/// consumer and never fails: once the ring is full the oldest sample is
/// overwritten. The sink has its own lock, independent of the transport lock.
#[derive(Debug)]
pub struct SampleSink {
    samples: Mutex<VecDeque<Sample>>,
    capacity: usize,
    overwritten: AtomicU64,
}

impl SampleSink {
    /// Create a sink retaining at most `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            overwritten: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, sample: Sample) {
        let mut samples = self.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        samples.push_back(sample);
    }

    pub fn extend(&self, batch: impl IntoIterator<Item = Sample>) {
        let mut samples = self.lock();
        for sample in batch {
            if samples.len() == self.capacity {
                samples.pop_front();
                self.overwritten.fetch_add(1, Ordering::Relaxed);
            }
            samples.push_back(sample);
        }
    }

    /// Take every buffered sample, oldest first, leaving the sink empty.
    pub fn drain_all(&self) -> Vec<Sample> {
        self.lock().drain(..).collect()
    }

    /// Newest sample, without removing it
    pub fn peek_latest(&self) -> Option<Sample> {
        self.lock().back().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples lost to overflow since the sink was created
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for SampleSink {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_SINK_CAPACITY)
    }
}
