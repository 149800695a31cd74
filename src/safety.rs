//! Safety floor enforcer.
//!
//! Cross-zone hardware-protection override: when *any* sensor reading
//! reaches the safety-floor threshold, every zone's decided speed is
//! raised to at least the floor duty — including zones pinned by the
//! static peripheral override. The latch is edge-triggered: one alert
//! on engagement (naming the hottest sensor), one informational event
//! on release, nothing in steady state.
//!
//! The check is a plain inclusive `>=` with no hysteresis band, so a
//! reading oscillating exactly at the threshold flaps the latch (and
//! the alert edge) every tick. Preserved as observed behavior.

use std::collections::BTreeMap;

use crate::alerts::AlertEvent;
use crate::control::band::Duty;

/// Edge-triggered safety floor latch.
#[derive(Debug, Default)]
pub struct SafetyFloor {
    active: bool,
}

impl SafetyFloor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the floor was active after the last evaluation.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Evaluate the floor against all current per-sensor readings.
    ///
    /// Returns whether the floor is active this tick, plus an event
    /// on either edge. An empty reading set never activates the
    /// floor (and releases it if it was active).
    pub fn evaluate(
        &mut self,
        readings: &BTreeMap<String, i64>,
        threshold: i64,
        floor: Duty,
    ) -> (bool, Option<AlertEvent>) {
        let hottest = readings
            .iter()
            .max_by_key(|&(_, &temp)| temp)
            .map(|(name, &temp)| (name.clone(), temp));

        match hottest {
            Some((sensor, temp)) if temp >= threshold => {
                let event = if self.active {
                    None
                } else {
                    self.active = true;
                    Some(AlertEvent::SafetyFloorEngaged {
                        sensor,
                        temp,
                        threshold,
                        floor,
                    })
                };
                (true, event)
            }
            _ => {
                let event = if self.active {
                    self.active = false;
                    Some(AlertEvent::SafetyFloorReleased)
                } else {
                    None
                };
                (false, event)
            }
        }
    }
}

/// Raise a decided duty to at least the floor duty.
///
/// Numeric max in duty units; the result is never below either
/// operand.
#[inline]
pub fn apply_floor(decided: Duty, floor: Duty) -> Duty {
    decided.max(floor)
}
