//! Error taxonomy root.
//!
//! Failure classes, by policy:
//! - [`ConfigError`] — fatal at startup only; the daemon refuses to
//!   run without a valid configuration.
//! - [`HalError`] — covers both sensor reads and fan actuation.
//!   Failed reads recover as absent readings; failed actuations are
//!   logged and retried on the next tick. Never fatal.
//! - [`TickError`] — any fault that aborts one loop iteration,
//!   caught at the loop boundary; the loop logs it and resumes after
//!   the normal interval. The control loop never terminates on a bad
//!   tick.

pub use crate::config::ConfigError;
pub use crate::hal::HalError;

/// A fault that aborted one control-loop iteration.
#[derive(Debug, thiserror::Error)]
#[error("tick failed: {0}")]
pub struct TickError(pub String);
