//! Adaptive polling controller.
//!
//! The next poll interval is derived purely from the current tick's
//! worst load state: high load means faster sampling. There is no
//! hysteresis and no debounce — the interval may oscillate tick to
//! tick if load does, which is intentional (faster sampling exactly
//! when it is needed).

use std::time::Duration;

use crate::config::PollingConfig;
use crate::control::band::LoadState;

/// Poll interval for the next tick, given the worst current state.
#[inline]
pub fn next_interval(worst: LoadState, polling: &PollingConfig) -> Duration {
    if worst.is_high_load() {
        polling.high_load()
    } else {
        polling.normal()
    }
}
