//! Control loop orchestration.
//!
//! One tick: resolve all zone temperatures → decide per-zone speeds
//! (static override respected) → enforce the safety floor across all
//! zones → actuate only zones whose computed speed changed (CPU zones
//! first) → append telemetry → run the alert engine → recompute the
//! poll cadence → publish status → signal liveness → sleep.
//!
//! A tick runs to completion or fails and is abandoned; iterations
//! are never interleaved. Any fault caught at the loop boundary is
//! logged and the loop resumes after the *normal* interval — the
//! control loop itself never terminates on a single bad tick. The
//! only cancellation is process shutdown, which always lets the
//! current tick finish.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, error, info, warn};

use crate::alerts::{AlertEngine, AlertEvent, Severity};
use crate::config::ZoneKind;
use crate::control::band::{self, Duty, LoadState};
use crate::control::{poll, resolver};
use crate::error::TickError;
use crate::hal::{FanActuator, SensorReader};
use crate::safety::{self, SafetyFloor};
use crate::shared::{ConfigHandle, StatusCell, TickStatus, ZoneStatus};
use crate::telemetry::{TelemetryHandle, TelemetrySample};
use crate::watchdog::SdNotify;

/// Granularity of the interruptible inter-tick sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

// ─── Controller State ───────────────────────────────────────────────

/// Mutable runtime state, single owner = the cycle runner.
///
/// `applied` holds the last *successfully* applied duty per zone —
/// not necessarily the last computed one, since actuation can fail.
#[derive(Debug)]
struct ControllerState {
    applied: BTreeMap<String, Duty>,
    floor: SafetyFloor,
    alerts: AlertEngine,
    poll_interval: Duration,
}

/// Per-zone intermediate results within one tick.
struct ZoneTick {
    name: String,
    raw_id: u8,
    kind: ZoneKind,
    temp: Option<i64>,
    duty: Duty,
    state: LoadState,
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the control loop: configuration snapshots, hardware seams,
/// latched state, telemetry, and pacing.
pub struct CycleRunner {
    config: ConfigHandle,
    sensors: Box<dyn SensorReader>,
    fans: Box<dyn FanActuator>,
    telemetry: TelemetryHandle,
    status: StatusCell,
    notify: SdNotify,
    running: Arc<AtomicBool>,
    dry_run: bool,
    state: ControllerState,
}

impl CycleRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConfigHandle,
        sensors: Box<dyn SensorReader>,
        fans: Box<dyn FanActuator>,
        telemetry: TelemetryHandle,
        status: StatusCell,
        notify: SdNotify,
        running: Arc<AtomicBool>,
        dry_run: bool,
    ) -> Self {
        let poll_interval = config.snapshot().polling.normal();
        Self {
            config,
            sensors,
            fans,
            telemetry,
            status,
            notify,
            running,
            dry_run,
            state: ControllerState {
                applied: BTreeMap::new(),
                floor: SafetyFloor::new(),
                alerts: AlertEngine::new(),
                poll_interval,
            },
        }
    }

    /// Poll interval selected by the most recent tick.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        self.state.poll_interval
    }

    /// Last successfully applied duty for a zone, if any.
    pub fn applied_duty(&self, zone: &str) -> Option<Duty> {
        self.state.applied.get(zone).copied()
    }

    /// Whether the safety floor latch is currently engaged.
    #[inline]
    pub fn safety_floor_active(&self) -> bool {
        self.state.floor.is_active()
    }

    /// Enter the control loop until the running flag clears.
    ///
    /// The flag is only checked between ticks, so the current tick
    /// always completes (actuation is never left half-applied by
    /// shutdown; within a tick, CPU zones are actuated first).
    pub fn run(&mut self) {
        self.notify.ready();
        info!("entering control loop");

        while self.running.load(Ordering::SeqCst) {
            let wall = SystemTime::now();
            let now = Instant::now();

            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.tick(wall, now)));
            let interval = match outcome {
                Ok(interval) => interval,
                Err(payload) => {
                    let err = TickError(panic_message(payload.as_ref()));
                    error!("{err}; resuming after normal interval");
                    self.config.snapshot().polling.normal()
                }
            };

            self.sleep(interval);
        }

        self.notify.stopping();
        info!("control loop stopped");
    }

    /// Execute one complete control iteration.
    ///
    /// Returns the poll interval to sleep before the next tick.
    pub fn tick(&mut self, wall: SystemTime, now: Instant) -> Duration {
        let cfg = self.config.snapshot();

        // ═══ READ PHASE ═══
        // One read per unique sensor; a failed read marks the sensor
        // absent for this tick (no retries inside a tick).
        let mut readings: BTreeMap<String, i64> = BTreeMap::new();
        let mut attempted: BTreeSet<&str> = BTreeSet::new();
        for zone in &cfg.zones {
            for sensor in &zone.sensors {
                if !attempted.insert(sensor.as_str()) {
                    continue;
                }
                match self.sensors.read_temperature(sensor) {
                    Ok(temp) => {
                        readings.insert(sensor.clone(), temp);
                    }
                    Err(e) => {
                        error!(sensor = %sensor, "error reading sensor: {e}");
                    }
                }
            }
        }

        // ═══ DECIDE PHASE ═══
        // Temperature is resolved even for statically pinned zones so
        // it still shows up in telemetry and status.
        let mut zones: Vec<ZoneTick> = Vec::with_capacity(cfg.zones.len());
        for zone in &cfg.zones {
            let temp =
                resolver::resolve_zone(&zone.sensors, |s| readings.get(s).copied());
            let (duty, state) =
                if zone.kind == ZoneKind::Peripheral && cfg.static_peripheral.enabled {
                    (cfg.static_peripheral.speed, LoadState::Static)
                } else {
                    band::decide(temp, &cfg.thresholds, &cfg.fan_speeds)
                };
            zones.push(ZoneTick {
                name: zone.name.clone(),
                raw_id: zone.raw_id,
                kind: zone.kind,
                temp,
                duty,
                state,
            });
        }

        // ═══ SAFETY FLOOR ═══
        // Applied after the decision engine and after the static
        // bypass — the floor always wins, it is a hardware backstop.
        let (floor_active, floor_edge) = self.state.floor.evaluate(
            &readings,
            cfg.thresholds.safety_floor,
            cfg.fan_speeds.safety_floor_speed,
        );
        if let Some(event) = floor_edge {
            emit(&event);
        }
        if floor_active {
            for z in &mut zones {
                let raised = safety::apply_floor(z.duty, cfg.fan_speeds.safety_floor_speed);
                if raised != z.duty {
                    debug!(
                        zone = %z.name, from = %z.duty, to = %raised,
                        "safety floor raised zone duty"
                    );
                    z.duty = raised;
                }
            }
        }

        // ═══ ACTUATE PHASE ═══
        // Only zones whose computed duty differs from the last applied
        // one; CPU zones first. A failed actuation keeps the previous
        // applied value, so the diff repeats and retries next tick.
        let mut order: Vec<usize> = (0..zones.len()).collect();
        order.sort_by_key(|&i| zones[i].kind != ZoneKind::Cpu);
        for &i in &order {
            let z = &zones[i];
            if self.state.applied.get(&z.name) == Some(&z.duty) {
                continue;
            }
            if self.dry_run {
                info!(zone = %z.name, duty = %z.duty, state = %z.state, "dry-run: skipping actuation");
                self.state.applied.insert(z.name.clone(), z.duty);
                continue;
            }
            match self.fans.set_zone_duty(z.raw_id, z.duty) {
                Ok(()) => {
                    info!(zone = %z.name, duty = %z.duty, state = %z.state, "fan speed changed");
                    self.state.applied.insert(z.name.clone(), z.duty);
                }
                Err(e) => {
                    error!(zone = %z.name, "error setting fan speed: {e}");
                }
            }
        }

        // ═══ TELEMETRY ═══
        let load_states: BTreeMap<String, LoadState> =
            zones.iter().map(|z| (z.name.clone(), z.state)).collect();
        self.telemetry.push(TelemetrySample {
            timestamp: wall,
            temps: readings.clone(),
            fan_speeds: self.state.applied.clone(),
            load_states: load_states.clone(),
        });

        // ═══ ALERTS ═══
        let worst = band::worst_state(zones.iter().map(|z| z.state));
        let batch = self.state.alerts.tick(
            worst,
            now,
            &cfg.alerts,
            cfg.thresholds.high,
            cfg.thresholds.emergency,
        );
        for event in &batch {
            emit(event);
        }

        // ═══ RESCHEDULE & STATUS ═══
        let interval = poll::next_interval(worst, &cfg.polling);
        self.state.poll_interval = interval;

        self.status.publish(TickStatus {
            timestamp: wall,
            zones: zones
                .iter()
                .map(|z| ZoneStatus {
                    name: z.name.clone(),
                    temperature: z.temp,
                    fan_speed: self.state.applied.get(&z.name).copied(),
                    load_state: z.state,
                })
                .collect(),
            sensor_temps: readings.clone(),
            safety_floor_active: floor_active,
            poll_interval_secs: interval.as_secs(),
        });

        info!(
            temps = %format_map(readings.iter().map(|(k, v)| (k.as_str(), format!("{v}C")))),
            fans = %format_map(zones.iter().map(|z| {
                let duty = self
                    .state
                    .applied
                    .get(&z.name)
                    .map_or_else(|| "-".to_string(), ToString::to_string);
                (z.name.as_str(), duty)
            })),
            states = %format_map(load_states.iter().map(|(k, v)| (k.as_str(), v.to_string()))),
            poll_secs = interval.as_secs(),
            "tick complete"
        );

        self.notify.alive();
        interval
    }

    /// Sleep in short slices so shutdown stays responsive between ticks.
    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Route one alert event to the log transport at its severity.
fn emit(event: &AlertEvent) {
    match event.severity() {
        Severity::Alert => error!("ALERT: {event}"),
        Severity::Warning => warn!("{event}"),
        Severity::Info => info!("{event}"),
    }
}

fn format_map<'a, I>(entries: I) -> String
where
    I: Iterator<Item = (&'a str, String)>,
{
    entries
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
