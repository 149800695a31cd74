//! Shared state between the control loop and the monitoring surface.
//!
//! Configuration is immutable per tick: the loop takes one `Arc`
//! snapshot at tick start; the config surface validates a whole new
//! value and swaps it in under the lock. Partial updates are
//! impossible by construction — readers only ever observe a complete
//! configuration.
//!
//! The monitoring/administration web surface itself is an external
//! collaborator; this module provides the seam it consumes: a config
//! handle, the latest tick status, and JSON-serializable snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

use tracing::warn;

use crate::config::{Config, ConfigError};
use crate::control::band::{Duty, LoadState};
use crate::hal::{SensorReader, SensorRow};
use crate::telemetry::{TelemetryHandle, TelemetrySample};

// ─── Config Handle ──────────────────────────────────────────────────

/// Copy-on-write configuration handle.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Atomic snapshot of the current configuration.
    ///
    /// Cheap (`Arc` clone); the returned value never changes under
    /// the caller.
    pub fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.inner.read())
    }

    /// Validate and install a new configuration.
    ///
    /// The control loop observes the new value from its next tick
    /// onward. Rejected configurations leave the current one intact.
    pub fn install(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        *self.inner.write() = Arc::new(config);
        Ok(())
    }
}

// ─── Status ─────────────────────────────────────────────────────────

/// Per-zone slice of the latest tick.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatus {
    pub name: String,
    /// Resolved temperature, absent on total read failure.
    pub temperature: Option<i64>,
    /// Last successfully applied duty, absent before first actuation.
    pub fan_speed: Option<Duty>,
    pub load_state: LoadState,
}

/// Snapshot of the most recently completed tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickStatus {
    pub timestamp: SystemTime,
    pub zones: Vec<ZoneStatus>,
    /// All per-sensor readings that resolved this tick.
    pub sensor_temps: BTreeMap<String, i64>,
    pub safety_floor_active: bool,
    pub poll_interval_secs: u64,
}

/// Latest tick status, published by the loop, read by the surface.
#[derive(Debug, Clone, Default)]
pub struct StatusCell {
    inner: Arc<RwLock<Option<TickStatus>>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: TickStatus) {
        *self.inner.write() = Some(status);
    }

    pub fn latest(&self) -> Option<TickStatus> {
        self.inner.read().clone()
    }
}

/// Full status document for the monitoring surface.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub current: Option<TickStatus>,
    pub history: Vec<TelemetrySample>,
    /// Raw hardware sensor dump; empty when the dump is unavailable.
    pub sensors: Vec<SensorRow>,
}

/// Assemble the full status JSON document, including the raw sensor
/// dump. A failed dump is non-fatal: the report carries an empty
/// sensor list and the failure is logged.
pub fn status_report(
    status: &StatusCell,
    telemetry: &TelemetryHandle,
    sensors: &dyn SensorReader,
) -> Result<serde_json::Value, serde_json::Error> {
    let rows = match sensors.read_all_sensors() {
        Ok(rows) => rows,
        Err(e) => {
            warn!("sensor dump unavailable for status report: {e}");
            Vec::new()
        }
    };
    serde_json::to_value(StatusReport {
        current: status.latest(),
        history: telemetry.snapshot(),
        sensors: rows,
    })
}

/// Serialize the active configuration for the config surface.
pub fn config_report(config: &ConfigHandle) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(&*config.snapshot())
}
