//! Hardware access seams.
//!
//! Two narrow interfaces isolate the control core from how hardware
//! access is transported: a sensor reader and a fan actuator. The
//! core never retries within a tick — a failed sensor read becomes an
//! absent reading, a failed actuation is retried naturally on the
//! next tick because the speed diff still shows a mismatch.

pub mod ipmi;

use serde::Serialize;
use thiserror::Error;

use crate::control::band::Duty;

/// Error types for hardware transport operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Subprocess or transport did not complete within the deadline.
    /// A normal, recoverable failure — never fatal.
    #[error("'{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// Transport-level failure (spawn, I/O, non-zero exit).
    #[error("transport error: {0}")]
    Transport(String),

    /// Output arrived but could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),
}

/// One raw sensor row from a full hardware dump, for status
/// reporting only — never used for control decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorRow {
    pub name: String,
    pub value: String,
    pub unit: String,
    pub status: String,
    pub lower_nr: String,
    pub lower_c: String,
    pub lower_nc: String,
    pub upper_nc: String,
    pub upper_c: String,
    pub upper_nr: String,
}

/// Read temperatures from named hardware sensors.
pub trait SensorReader: Send + Sync {
    /// Read one sensor's temperature [°C].
    ///
    /// Any failure (timeout, transport, unparseable reading) is an
    /// error the core treats as absence; no retries here.
    fn read_temperature(&self, sensor: &str) -> Result<i64, HalError>;

    /// Dump all sensor rows for full-status reporting.
    fn read_all_sensors(&self) -> Result<Vec<SensorRow>, HalError>;
}

/// Issue fan-speed commands to hardware zones.
pub trait FanActuator: Send + Sync {
    /// Command one zone to the given duty.
    ///
    /// Blocking, bounded-duration; the core retries only across
    /// ticks, never within one.
    fn set_zone_duty(&self, zone_raw_id: u8, duty: Duty) -> Result<(), HalError>;
}
