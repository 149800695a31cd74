//! Control engine root.
//!
//! Pure per-tick decision logic: zone temperature resolution, speed
//! band selection, and adaptive poll cadence. All functions here are
//! stateless; latched behavior lives in `safety` and `alerts`.

pub mod band;
pub mod poll;
pub mod resolver;
