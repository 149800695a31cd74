//! Integration tests for the fanctld control loop.
//!
//! Exercises full ticks through `CycleRunner` with fake sensor and
//! actuator implementations: decision pipeline, safety floor,
//! actuation diffing and retry, static peripheral override, adaptive
//! polling, telemetry, and config hot-swap.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;

use fanctld::config::load_config_from_str;
use fanctld::control::band::{Duty, LoadState};
use fanctld::cycle::CycleRunner;
use fanctld::hal::{FanActuator, HalError, SensorReader, SensorRow};
use fanctld::shared::{ConfigHandle, StatusCell};
use fanctld::telemetry::TelemetryHandle;
use fanctld::watchdog::SdNotify;

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeSensors {
    temps: Arc<Mutex<BTreeMap<String, i64>>>,
}

impl FakeSensors {
    fn set(&self, sensor: &str, temp: i64) {
        self.temps.lock().insert(sensor.to_string(), temp);
    }

    fn remove(&self, sensor: &str) {
        self.temps.lock().remove(sensor);
    }
}

impl SensorReader for FakeSensors {
    fn read_temperature(&self, sensor: &str) -> Result<i64, HalError> {
        self.temps
            .lock()
            .get(sensor)
            .copied()
            .ok_or_else(|| HalError::Transport(format!("no such sensor '{sensor}'")))
    }

    fn read_all_sensors(&self) -> Result<Vec<SensorRow>, HalError> {
        Ok(vec![])
    }
}

#[derive(Clone, Default)]
struct FakeFans {
    calls: Arc<Mutex<Vec<(u8, Duty)>>>,
    failing_zones: Arc<Mutex<BTreeSet<u8>>>,
}

impl FakeFans {
    fn calls(&self) -> Vec<(u8, Duty)> {
        self.calls.lock().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn fail_zone(&self, raw_id: u8) {
        self.failing_zones.lock().insert(raw_id);
    }

    fn heal_zone(&self, raw_id: u8) {
        self.failing_zones.lock().remove(&raw_id);
    }
}

impl FanActuator for FakeFans {
    fn set_zone_duty(&self, zone_raw_id: u8, duty: Duty) -> Result<(), HalError> {
        if self.failing_zones.lock().contains(&zone_raw_id) {
            return Err(HalError::Timeout {
                command: format!("raw fan zone 0x{zone_raw_id:02x}"),
                timeout_secs: 10,
            });
        }
        self.calls.lock().push((zone_raw_id, duty));
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

const BASE_CONFIG: &str = r#"
[ipmi]
host = "10.0.0.2"
username = "ADMIN"
password = "secret"

[thresholds]
moderate = 50
high = 75
emergency = 90
safety_floor = 95

[fan_speeds]
idle = 6
moderate = 25
high = 50
emergency = 100
safety_floor_speed = 60
error_safe = 50

[static_peripheral]
enabled = false
speed = 10

[polling]
normal_secs = 15
high_load_secs = 5

[alerts]
sustained_high_load_secs = 300
high_load_event_window_secs = 3600
high_load_event_threshold = 3

[telemetry]
history_size = 16

[[zones]]
name = "cpu"
kind = "cpu"
raw_id = 0
sensors = ["CPU Temp"]

[[zones]]
name = "peripheral"
kind = "peripheral"
raw_id = 1
sensors = ["System Temp", "Peripheral Temp"]
"#;

struct Harness {
    runner: CycleRunner,
    sensors: FakeSensors,
    fans: FakeFans,
    config: ConfigHandle,
    telemetry: TelemetryHandle,
    status: StatusCell,
}

impl Harness {
    fn new(config_toml: &str) -> Self {
        Self::with_dry_run(config_toml, false)
    }

    fn with_dry_run(config_toml: &str, dry_run: bool) -> Self {
        let config = ConfigHandle::new(load_config_from_str(config_toml).unwrap());
        let sensors = FakeSensors::default();
        let fans = FakeFans::default();
        let telemetry = TelemetryHandle::new(16);
        let status = StatusCell::new();
        let runner = CycleRunner::new(
            config.clone(),
            Box::new(sensors.clone()),
            Box::new(fans.clone()),
            telemetry.clone(),
            status.clone(),
            SdNotify::disabled(),
            Arc::new(AtomicBool::new(true)),
            dry_run,
        );
        Self {
            runner,
            sensors,
            fans,
            config,
            telemetry,
            status,
        }
    }

    fn tick(&mut self) -> std::time::Duration {
        self.runner.tick(SystemTime::now(), Instant::now())
    }
}

fn duty(percent: u8) -> Duty {
    Duty::new(percent).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn nominal_tick_cpu_high_peripheral_idle() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 80);
    h.sensors.set("System Temp", 40);
    h.sensors.set("Peripheral Temp", 35);

    let interval = h.tick();

    // cpu → High (50%), peripheral → Idle (6%), no floor, fast polling.
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(50)));
    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(6)));
    assert!(!h.runner.safety_floor_active());
    assert_eq!(interval.as_secs(), 5);

    let status = h.status.latest().unwrap();
    assert_eq!(status.zones[0].load_state, LoadState::High);
    assert_eq!(status.zones[1].load_state, LoadState::Idle);
    assert_eq!(status.zones[0].temperature, Some(80));
    // Peripheral resolves to the hottest of its two sensors.
    assert_eq!(status.zones[1].temperature, Some(40));
}

#[test]
fn cpu_zone_actuated_first() {
    // Peripheral listed before cpu in config; actuation still orders
    // cpu zones first.
    let flipped = {
        let cpu_start = BASE_CONFIG.find("[[zones]]").unwrap();
        let head = &BASE_CONFIG[..cpu_start];
        format!(
            "{head}\n\
             [[zones]]\n\
             name = \"peripheral\"\n\
             kind = \"peripheral\"\n\
             raw_id = 1\n\
             sensors = [\"System Temp\"]\n\n\
             [[zones]]\n\
             name = \"cpu\"\n\
             kind = \"cpu\"\n\
             raw_id = 0\n\
             sensors = [\"CPU Temp\"]\n"
        )
    };
    let mut h = Harness::new(&flipped);
    h.sensors.set("CPU Temp", 60);
    h.sensors.set("System Temp", 60);

    h.tick();

    let calls = h.fans.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, 0, "cpu zone must be actuated first");
    assert_eq!(calls[1].0, 1);
}

#[test]
fn safety_floor_raises_every_zone() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 96);
    h.sensors.set("System Temp", 40);
    h.sensors.set("Peripheral Temp", 35);

    h.tick();

    // cpu decided Emergency (100%) stays; peripheral Idle (6%) is
    // raised to the 60% floor.
    assert!(h.runner.safety_floor_active());
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(100)));
    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(60)));

    // Floor releases once everything cools down.
    h.sensors.set("CPU Temp", 40);
    h.tick();
    assert!(!h.runner.safety_floor_active());
    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(6)));
}

#[test]
fn safety_floor_overrides_static_peripheral() {
    let enabled = BASE_CONFIG.replace("enabled = false", "enabled = true");
    let mut h = Harness::new(&enabled);
    h.sensors.set("CPU Temp", 96);
    h.sensors.set("System Temp", 30);

    h.tick();

    // Static pin requests 10%, but the floor wins.
    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(60)));
    let status = h.status.latest().unwrap();
    let periph = status
        .zones
        .iter()
        .find(|z| z.name == "peripheral")
        .unwrap();
    assert_eq!(periph.load_state, LoadState::Static);
    // Temperature is still resolved for reporting.
    assert_eq!(periph.temperature, Some(30));
}

#[test]
fn static_peripheral_pins_speed_regardless_of_temperature() {
    let enabled = BASE_CONFIG.replace("enabled = false", "enabled = true");
    let mut h = Harness::new(&enabled);
    h.sensors.set("CPU Temp", 40);
    h.sensors.set("System Temp", 85); // would be High without the pin

    let interval = h.tick();

    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(10)));
    // Static is excluded from severity: worst is cpu Idle → normal poll.
    assert_eq!(interval.as_secs(), 15);
}

#[test]
fn unchanged_speeds_are_not_reactuated() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 60);
    h.sensors.set("System Temp", 40);

    h.tick();
    assert_eq!(h.fans.calls().len(), 2);
    h.fans.clear_calls();

    // Same temperatures → same duties → zero actuations.
    h.tick();
    assert!(h.fans.calls().is_empty());
}

#[test]
fn failed_actuation_retries_next_tick() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 60);
    h.sensors.set("System Temp", 40);
    h.fans.fail_zone(1);

    h.tick();
    // cpu applied, peripheral not (actuation failed).
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(25)));
    assert_eq!(h.runner.applied_duty("peripheral"), None);

    // Next tick: the diff still shows a mismatch, so it retries.
    h.fans.heal_zone(1);
    h.fans.clear_calls();
    h.tick();
    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(6)));
    assert_eq!(h.fans.calls(), vec![(1, duty(6))]);
}

#[test]
fn unreadable_zone_falls_back_to_error_safe() {
    let mut h = Harness::new(BASE_CONFIG);
    // No cpu sensor at all this tick.
    h.sensors.set("System Temp", 40);

    let interval = h.tick();

    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(50)));
    let status = h.status.latest().unwrap();
    let cpu = status.zones.iter().find(|z| z.name == "cpu").unwrap();
    assert_eq!(cpu.load_state, LoadState::Error);
    assert_eq!(cpu.temperature, None);
    // Error ties High in severity but does not speed up polling.
    assert_eq!(interval.as_secs(), 15);
}

#[test]
fn partial_sensor_failure_does_not_blind_the_zone() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 40);
    h.sensors.set("System Temp", 78);
    // "Peripheral Temp" missing: zone resolves from the readable one.

    h.tick();

    let status = h.status.latest().unwrap();
    let periph = status
        .zones
        .iter()
        .find(|z| z.name == "peripheral")
        .unwrap();
    assert_eq!(periph.temperature, Some(78));
    assert_eq!(periph.load_state, LoadState::High);
}

#[test]
fn sensor_recovery_clears_error_state() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("System Temp", 40);
    h.tick();
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(50)));

    h.sensors.set("CPU Temp", 30);
    h.tick();
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(6)));
    let status = h.status.latest().unwrap();
    assert_eq!(status.zones[0].load_state, LoadState::Idle);
}

#[test]
fn telemetry_records_applied_speeds_and_states() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 80);
    h.sensors.set("System Temp", 40);

    h.tick();
    h.sensors.set("CPU Temp", 30);
    h.tick();

    let history = h.telemetry.snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].temps["CPU Temp"], 80);
    assert_eq!(history[0].fan_speeds["cpu"], duty(50));
    assert_eq!(history[0].load_states["cpu"], LoadState::High);
    assert_eq!(history[1].fan_speeds["cpu"], duty(6));
    assert_eq!(history[1].load_states["cpu"], LoadState::Idle);
}

#[test]
fn config_hot_swap_takes_effect_next_tick() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 60);
    h.sensors.set("System Temp", 40);
    h.tick();
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(25)));

    // Lower the high threshold below the current reading.
    let mut updated = (*h.config.snapshot()).clone();
    updated.thresholds.high = 55;
    h.config.install(updated).unwrap();

    let interval = h.tick();
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(50)));
    assert_eq!(interval.as_secs(), 5);
}

#[test]
fn dry_run_issues_no_fan_commands() {
    let mut h = Harness::with_dry_run(BASE_CONFIG, true);
    h.sensors.set("CPU Temp", 80);
    h.sensors.set("System Temp", 40);

    h.tick();

    assert!(h.fans.calls().is_empty());
    // Decisions are still tracked so the diff behaves normally.
    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(50)));
}

#[test]
fn total_sensor_loss_drives_everything_error_safe() {
    let mut h = Harness::new(BASE_CONFIG);
    h.sensors.set("CPU Temp", 60);
    h.sensors.set("System Temp", 60);
    h.tick();

    h.sensors.remove("CPU Temp");
    h.sensors.remove("System Temp");
    h.tick();

    assert_eq!(h.runner.applied_duty("cpu"), Some(duty(50)));
    assert_eq!(h.runner.applied_duty("peripheral"), Some(duty(50)));
    assert!(!h.runner.safety_floor_active());
    let status = h.status.latest().unwrap();
    assert!(status.sensor_temps.is_empty());
    assert!(status.zones.iter().all(|z| z.load_state == LoadState::Error));
}
