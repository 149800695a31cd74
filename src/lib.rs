//! # fanctld
//!
//! Thermal control and alerting daemon for SuperMicro servers.
//! Translates periodic IPMI temperature readings into fan-speed
//! commands, enforces a hardware safety floor across all zones,
//! debounces and escalates operator-visible alerts, and adapts its
//! own polling cadence to load.
//!
//! ## Architecture
//!
//! Data flows one poll tick at a time:
//! resolver → decision engine → safety floor → actuation →
//! telemetry + alerts → polling controller → sleep → repeat.
//!
//! - [`control`] — pure decision logic (band selection, zone
//!   resolution, adaptive polling)
//! - [`safety`] — cross-zone safety floor with edge-triggered latch
//! - [`alerts`] — three independent debounced alert mechanisms
//! - [`telemetry`] — bounded in-memory history with snapshot reads
//! - [`hal`] — narrow sensor/actuator seams + `ipmitool` transport
//! - [`shared`] — copy-on-write config handle and status reporting
//! - [`cycle`] — the sequential control loop tying it all together
//!
//! ## Concurrency
//!
//! The control loop is a single sequential process: one tick fully
//! completes before the next begins. The monitoring surface reads
//! config/status concurrently through [`shared`] and [`telemetry`]
//! snapshots; the loop takes one atomic config snapshot per tick, so
//! partial updates are never observable mid-tick.

pub mod alerts;
pub mod config;
pub mod control;
pub mod cycle;
pub mod error;
pub mod hal;
pub mod safety;
pub mod shared;
pub mod telemetry;
pub mod watchdog;
