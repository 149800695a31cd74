//! Bounded telemetry history.
//!
//! Fixed-capacity ring of per-tick samples: append-only from the
//! control loop, snapshot reads for the status surface. Overflow
//! silently evicts the oldest sample. A snapshot is a point-in-time
//! copy that a concurrent append can never mutate.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

use crate::control::band::{Duty, LoadState};

/// One completed tick's observations.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySample {
    pub timestamp: SystemTime,
    /// Per-sensor readings that resolved this tick.
    pub temps: BTreeMap<String, i64>,
    /// Per-zone last successfully applied duty.
    pub fan_speeds: BTreeMap<String, Duty>,
    /// Per-zone load state.
    pub load_states: BTreeMap<String, LoadState>,
}

/// Fixed-capacity ring of telemetry samples.
#[derive(Debug)]
pub struct TelemetryRing {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
}

impl TelemetryRing {
    /// Create an empty ring. Capacity must be non-zero (enforced by
    /// config validation).
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest on overflow. O(1) amortized.
    pub fn push(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Point-in-time copy of the whole window, oldest first.
    pub fn snapshot(&self) -> Vec<TelemetrySample> {
        self.samples.iter().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Shared handle: the control loop appends, status readers snapshot.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    ring: Arc<RwLock<TelemetryRing>>,
}

impl TelemetryHandle {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(RwLock::new(TelemetryRing::new(capacity))),
        }
    }

    pub fn push(&self, sample: TelemetrySample) {
        self.ring.write().push(sample);
    }

    pub fn snapshot(&self) -> Vec<TelemetrySample> {
        self.ring.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.ring.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.read().is_empty()
    }
}
