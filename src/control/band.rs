//! Speed bands, duty values, and the pure speed decision function.
//!
//! `decide()` maps one resolved zone temperature to a (duty, state) pair
//! using inclusive lower bounds: a reading exactly on a boundary always
//! lands in the higher band. The function holds no state and no
//! hysteresis, so band selection is deterministic per tick.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{FanSpeeds, Thresholds};

// ─── Duty ───────────────────────────────────────────────────────────

/// Fan duty cycle as a percentage, 0–100.
///
/// The SuperMicro raw fan command encodes duty as a single byte
/// 0x00–0x64, which is exactly the percentage value, so `raw()` and
/// `percent()` coincide. The total order on `Duty` is the numeric
/// order on the percentage; the safety floor uses `Duty::max`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Duty(u8);

impl Duty {
    /// Create a duty value, rejecting anything above 100%.
    pub fn new(percent: u8) -> Result<Self, DutyRangeError> {
        if percent > 100 {
            return Err(DutyRangeError(percent));
        }
        Ok(Self(percent))
    }

    /// Create a duty value, saturating at 100%.
    pub const fn saturating(percent: u8) -> Self {
        if percent > 100 { Self(100) } else { Self(percent) }
    }

    /// Duty as a percentage (0–100).
    #[inline]
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Duty as the raw IPMI command byte (0x00–0x64).
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for Duty {
    type Error = DutyRangeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Duty> for u8 {
    fn from(duty: Duty) -> Self {
        duty.0
    }
}

/// Duty percentage out of the 0–100 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("duty {0}% out of range [0, 100]")]
pub struct DutyRangeError(pub u8);

// ─── Load State ─────────────────────────────────────────────────────

/// Discrete thermal severity classification of a zone.
///
/// `Idle < Moderate < High < Emergency` for alerting purposes.
/// `Error` (unreadable zone) carries severity weight 2 — deliberately
/// tied with `High`, not above it, so a reading failure alone never
/// triggers emergency-class alerting. `Static` (manually pinned zone)
/// is excluded from severity comparisons entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// Below the moderate threshold.
    Idle,
    /// At or above the moderate threshold.
    Moderate,
    /// At or above the high threshold.
    High,
    /// At or above the emergency threshold.
    Emergency,
    /// Zone temperature could not be resolved.
    Error,
    /// Zone manually pinned to a fixed speed.
    Static,
}

impl LoadState {
    /// Severity weight for worst-state selection.
    ///
    /// `None` means the state does not participate (Static).
    #[inline]
    pub const fn severity(self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Moderate => Some(1),
            Self::High | Self::Error => Some(2),
            Self::Emergency => Some(3),
            Self::Static => None,
        }
    }

    /// Whether this state counts as high load for the sustained-load
    /// timer and the adaptive polling controller.
    #[inline]
    pub const fn is_high_load(self) -> bool {
        matches!(self, Self::High | Self::Emergency)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Emergency => "emergency",
            Self::Error => "error",
            Self::Static => "static",
        };
        f.write_str(s)
    }
}

/// Reduce a set of per-zone load states to the single worst one.
///
/// Selection is by severity weight; `Static` zones are skipped. A tie
/// between `Error` and a thermal state of equal weight resolves in
/// favor of the thermal state, so polling and alerting behavior stays
/// deterministic regardless of zone iteration order.
pub fn worst_state<I>(states: I) -> LoadState
where
    I: IntoIterator<Item = LoadState>,
{
    let mut worst = LoadState::Idle;
    let mut worst_key = (0u8, 1u8);
    for state in states {
        let Some(sev) = state.severity() else {
            continue;
        };
        // Second key component breaks Error/High ties toward High.
        let key = (sev, u8::from(state != LoadState::Error));
        if key > worst_key {
            worst = state;
            worst_key = key;
        }
    }
    worst
}

// ─── Decision Function ──────────────────────────────────────────────

/// Map a resolved zone temperature to a (duty, state) pair.
///
/// An absent temperature maps to the error-safe speed. All band
/// comparisons are inclusive at the lower bound (`>=`).
pub fn decide(
    temp: Option<i64>,
    thresholds: &Thresholds,
    speeds: &FanSpeeds,
) -> (Duty, LoadState) {
    let Some(t) = temp else {
        return (speeds.error_safe, LoadState::Error);
    };

    if t >= thresholds.emergency {
        (speeds.emergency, LoadState::Emergency)
    } else if t >= thresholds.high {
        (speeds.high, LoadState::High)
    } else if t >= thresholds.moderate {
        (speeds.moderate, LoadState::Moderate)
    } else {
        (speeds.idle, LoadState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            moderate: 50,
            high: 75,
            emergency: 90,
            safety_floor: 95,
        }
    }

    fn speeds() -> FanSpeeds {
        FanSpeeds {
            idle: Duty::new(6).unwrap(),
            moderate: Duty::new(25).unwrap(),
            high: Duty::new(50).unwrap(),
            emergency: Duty::new(100).unwrap(),
            safety_floor_speed: Duty::new(36).unwrap(),
            error_safe: Duty::new(50).unwrap(),
        }
    }

    #[test]
    fn duty_rejects_over_100() {
        assert!(Duty::new(100).is_ok());
        assert_eq!(Duty::new(101), Err(DutyRangeError(101)));
    }

    #[test]
    fn decide_bands() {
        let th = thresholds();
        let sp = speeds();
        assert_eq!(decide(Some(30), &th, &sp), (sp.idle, LoadState::Idle));
        assert_eq!(
            decide(Some(60), &th, &sp),
            (sp.moderate, LoadState::Moderate)
        );
        assert_eq!(decide(Some(80), &th, &sp), (sp.high, LoadState::High));
        assert_eq!(
            decide(Some(95), &th, &sp),
            (sp.emergency, LoadState::Emergency)
        );
    }

    #[test]
    fn decide_inclusive_boundaries() {
        let th = thresholds();
        let sp = speeds();
        // Exactly on a boundary always maps to the higher band.
        assert_eq!(decide(Some(50), &th, &sp).1, LoadState::Moderate);
        assert_eq!(decide(Some(75), &th, &sp).1, LoadState::High);
        assert_eq!(decide(Some(90), &th, &sp).1, LoadState::Emergency);
        assert_eq!(decide(Some(49), &th, &sp).1, LoadState::Idle);
        assert_eq!(decide(Some(74), &th, &sp).1, LoadState::Moderate);
        assert_eq!(decide(Some(89), &th, &sp).1, LoadState::High);
    }

    #[test]
    fn decide_absent_is_error_safe() {
        let th = thresholds();
        let sp = speeds();
        assert_eq!(decide(None, &th, &sp), (sp.error_safe, LoadState::Error));
    }

    #[test]
    fn decide_is_monotonic() {
        let th = thresholds();
        let sp = speeds();
        let mut last = 0u8;
        for t in -20..120 {
            let (_, state) = decide(Some(t), &th, &sp);
            let sev = state.severity().unwrap();
            assert!(sev >= last, "band regressed at {t}");
            last = sev;
        }
    }

    #[test]
    fn worst_state_selection() {
        use LoadState::*;
        assert_eq!(worst_state([Idle, Moderate]), Moderate);
        assert_eq!(worst_state([Idle, Emergency, High]), Emergency);
        assert_eq!(worst_state([]), Idle);
    }

    #[test]
    fn worst_state_error_ties_resolve_to_thermal() {
        use LoadState::*;
        assert_eq!(worst_state([Error, High]), High);
        assert_eq!(worst_state([High, Error]), High);
        assert_eq!(worst_state([Error, Idle]), Error);
        assert_eq!(worst_state([Error, Emergency]), Emergency);
    }

    #[test]
    fn worst_state_skips_static() {
        use LoadState::*;
        assert_eq!(worst_state([Static, Idle]), Idle);
        assert_eq!(worst_state([Static]), Idle);
    }
}
