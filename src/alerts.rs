//! Alert and debounce engine.
//!
//! Alerts fire on state *transitions*, never on every poll. Three
//! independent mechanisms, each a small latched state machine ticked
//! once per control cycle, all of which may fire in the same tick:
//!
//! - **Emergency latch** — one alert when the worst state becomes
//!   Emergency; cleared silently as soon as it is not.
//! - **Sustained-load timer** — one warning when the worst state has
//!   been continuously High/Emergency for a configured duration; a
//!   full reset (clock and latch) on any exit from that set.
//! - **Event-frequency window** — sliding window of high-load entry
//!   timestamps; one warning when the count reaches the threshold,
//!   after which the whole window is cleared so the same burst cannot
//!   immediately re-trigger.
//!
//! Time is injected (`Instant` parameter) so every transition is
//! testable without the loop.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::AlertConfig;
use crate::control::band::{Duty, LoadState};

// ─── Events ─────────────────────────────────────────────────────────

/// Emission severity, mapped onto the log transport by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Alert,
}

/// One operator-visible alert decided by the core.
///
/// The core decides *what* to emit; formatting for a specific
/// transport happens at the loop boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    /// Worst state entered Emergency.
    Emergency {
        /// Emergency threshold [°C] in effect this tick.
        threshold: i64,
    },
    /// Worst state has been High/Emergency continuously for `elapsed`.
    SustainedHighLoad {
        elapsed: Duration,
        /// High threshold [°C] in effect this tick.
        threshold: i64,
    },
    /// Repeated high-load entries within the frequency window.
    HighLoadBurst { count: usize, window: Duration },
    /// A sensor breached the safety floor; all fans forced to at
    /// least the floor duty.
    SafetyFloorEngaged {
        sensor: String,
        temp: i64,
        threshold: i64,
        floor: Duty,
    },
    /// All sensors back below the safety floor.
    SafetyFloorReleased,
}

impl AlertEvent {
    /// Severity carried with the emission.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Emergency { .. } | Self::SafetyFloorEngaged { .. } => Severity::Alert,
            Self::SustainedHighLoad { .. } | Self::HighLoadBurst { .. } => Severity::Warning,
            Self::SafetyFloorReleased => Severity::Info,
        }
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emergency { threshold } => {
                write!(f, "EMERGENCY: temperature >= {threshold}C - fans at emergency speed")
            }
            Self::SustainedHighLoad { elapsed, threshold } => write!(
                f,
                "sustained high load for {}s (temp sustained >= {threshold}C)",
                elapsed.as_secs()
            ),
            Self::HighLoadBurst { count, window } => write!(
                f,
                "multiple high load events detected: {count} events in last {}s",
                window.as_secs()
            ),
            Self::SafetyFloorEngaged {
                sensor,
                temp,
                threshold,
                floor,
            } => write!(
                f,
                "safety floor enforced: {sensor} at {temp}C (threshold: {threshold}C) \
                 - all fans minimum {floor}"
            ),
            Self::SafetyFloorReleased => write!(f, "safety floor no longer required"),
        }
    }
}

/// Per-tick alert batch. At most one event per mechanism.
pub type AlertBatch = heapless::Vec<AlertEvent, 3>;

// ─── Emergency Latch ────────────────────────────────────────────────

/// Edge-triggered Emergency alert latch.
#[derive(Debug, Default)]
struct EmergencyLatch {
    active: bool,
}

impl EmergencyLatch {
    /// Returns an event exactly once per Emergency excursion.
    fn tick(&mut self, worst: LoadState, emergency_threshold: i64) -> Option<AlertEvent> {
        if worst == LoadState::Emergency {
            if !self.active {
                self.active = true;
                return Some(AlertEvent::Emergency {
                    threshold: emergency_threshold,
                });
            }
        } else {
            // Cleared silently; re-arms for the next excursion.
            self.active = false;
        }
        None
    }
}

// ─── Sustained-Load Timer ───────────────────────────────────────────

/// Tracks continuous time spent in {High, Emergency}.
#[derive(Debug, Default)]
struct SustainedLoadTimer {
    since: Option<Instant>,
    alerted: bool,
}

impl SustainedLoadTimer {
    /// Tick the timer. Returns `(entered, event)`:
    /// `entered` is true on the first tick inside the high-load set
    /// (the caller records one entry in the frequency window).
    fn tick(
        &mut self,
        worst: LoadState,
        now: Instant,
        threshold: Duration,
        high_threshold: i64,
    ) -> (bool, Option<AlertEvent>) {
        if !worst.is_high_load() {
            self.since = None;
            self.alerted = false;
            return (false, None);
        }

        match self.since {
            None => {
                self.since = Some(now);
                (true, None)
            }
            Some(start) => {
                let elapsed = now.duration_since(start);
                if elapsed >= threshold && !self.alerted {
                    self.alerted = true;
                    (
                        false,
                        Some(AlertEvent::SustainedHighLoad {
                            elapsed,
                            threshold: high_threshold,
                        }),
                    )
                } else {
                    (false, None)
                }
            }
        }
    }
}

// ─── Event-Frequency Window ─────────────────────────────────────────

/// Sliding window of high-load entry timestamps.
#[derive(Debug, Default)]
struct EventWindow {
    events: VecDeque<Instant>,
}

impl EventWindow {
    fn record(&mut self, now: Instant) {
        self.events.push_back(now);
    }

    /// Purge stale entries, then fire once and clear if the count
    /// meets the threshold.
    fn tick(&mut self, now: Instant, window: Duration, count_threshold: usize) -> Option<AlertEvent> {
        while let Some(&front) = self.events.front() {
            if now.duration_since(front) > window {
                self.events.pop_front();
            } else {
                break;
            }
        }

        if self.events.len() >= count_threshold {
            let count = self.events.len();
            self.events.clear();
            return Some(AlertEvent::HighLoadBurst {
                count,
                window,
            });
        }
        None
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.len()
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// All three alert mechanisms, ticked together once per cycle.
#[derive(Debug, Default)]
pub struct AlertEngine {
    emergency: EmergencyLatch,
    sustained: SustainedLoadTimer,
    window: EventWindow,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one tick's worst state against all three mechanisms.
    ///
    /// `high_threshold` and `emergency_threshold` are the configured
    /// band boundaries, carried into the emitted messages.
    pub fn tick(
        &mut self,
        worst: LoadState,
        now: Instant,
        alerts: &AlertConfig,
        high_threshold: i64,
        emergency_threshold: i64,
    ) -> AlertBatch {
        let mut batch = AlertBatch::new();

        if let Some(ev) = self.emergency.tick(worst, emergency_threshold) {
            let _ = batch.push(ev);
        }

        let (entered, sustained_ev) = self.sustained.tick(
            worst,
            now,
            alerts.sustained_high_load(),
            high_threshold,
        );
        if entered {
            self.window.record(now);
        }
        if let Some(ev) = sustained_ev {
            let _ = batch.push(ev);
        }

        if let Some(ev) = self
            .window
            .tick(now, alerts.event_window(), alerts.high_load_event_threshold)
        {
            let _ = batch.push(ev);
        }

        batch
    }
}
