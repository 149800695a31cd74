//! TOML configuration loader with startup validation.
//!
//! Loads the daemon configuration (IPMI endpoint, thresholds, fan
//! speeds, polling cadence, alert timing, zone→sensor mapping) and
//! validates it before the control loop ever starts. An invalid or
//! missing configuration is fatal at startup; the daemon refuses to
//! run without one.
//!
//! Validation notably enforces `moderate < high < emergency`; a
//! misordered set of bands would otherwise fail silently at runtime.
//! `safety_floor` stays unconstrained relative to `emergency`: it is
//! an independent hardware-protection backstop and may sit above or
//! below it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::band::Duty;

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    Io(String),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),

    /// Semantic validation error.
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Sections ───────────────────────────────────────────────────────

/// IPMI endpoint for the `ipmitool` transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpmiConfig {
    /// BMC hostname or IP address.
    pub host: String,
    /// BMC username.
    pub username: String,
    /// BMC password.
    pub password: String,
    /// Per-invocation subprocess timeout [s].
    #[serde(default = "default_ipmi_timeout")]
    pub timeout_secs: u64,
}

fn default_ipmi_timeout() -> u64 {
    10
}

impl IpmiConfig {
    /// Subprocess timeout as a `Duration`.
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Temperature boundaries [°C].
///
/// `moderate < high < emergency` is enforced at load time.
/// `safety_floor` is independent (typically above `emergency`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub moderate: i64,
    pub high: i64,
    pub emergency: i64,
    pub safety_floor: i64,
}

/// Fan duty values per band, plus the error-safe fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FanSpeeds {
    pub idle: Duty,
    pub moderate: Duty,
    pub high: Duty,
    pub emergency: Duty,
    /// Minimum duty enforced while the safety floor is active.
    pub safety_floor_speed: Duty,
    /// Duty applied to a zone whose temperature cannot be resolved.
    pub error_safe: Duty,
}

/// Manual pin for peripheral zones, independent of temperature.
///
/// Subordinate to the safety floor — the floor always wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StaticPeripheral {
    #[serde(default)]
    pub enabled: bool,
    pub speed: Duty,
}

impl Default for StaticPeripheral {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: Duty::saturating(6),
        }
    }
}

/// Poll cadence [s] for the two load regimes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollingConfig {
    pub normal_secs: u64,
    pub high_load_secs: u64,
}

impl PollingConfig {
    #[inline]
    pub fn normal(&self) -> Duration {
        Duration::from_secs(self.normal_secs)
    }

    #[inline]
    pub fn high_load(&self) -> Duration {
        Duration::from_secs(self.high_load_secs)
    }
}

/// Alert debounce timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Continuous high-load duration before the sustained warning [s].
    pub sustained_high_load_secs: u64,
    /// Width of the high-load event frequency window [s].
    pub high_load_event_window_secs: u64,
    /// Event count within the window that triggers the burst warning.
    pub high_load_event_threshold: usize,
}

impl AlertConfig {
    #[inline]
    pub fn sustained_high_load(&self) -> Duration {
        Duration::from_secs(self.sustained_high_load_secs)
    }

    #[inline]
    pub fn event_window(&self) -> Duration {
        Duration::from_secs(self.high_load_event_window_secs)
    }
}

/// Telemetry ring sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Ring capacity in samples; oldest is evicted on overflow.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_history_size() -> usize {
    240
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
        }
    }
}

/// Role of a fan zone.
///
/// CPU zones are actuated first during a tick (safety-relevant
/// ordering on shutdown); peripheral zones are eligible for the
/// static-speed override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Cpu,
    Peripheral,
}

/// One fan zone: a named group of fans/sensors controlled as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone identifier (e.g. "cpu", "peripheral").
    pub name: String,
    pub kind: ZoneKind,
    /// SuperMicro raw zone id byte (0x00 = CPU, 0x01 = peripheral).
    pub raw_id: u8,
    /// IPMI sensor names aggregated into this zone.
    #[serde(default)]
    pub sensors: Vec<String>,
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete validated daemon configuration.
///
/// Immutable per tick: the control loop takes an `Arc` snapshot at
/// tick start; the config surface swaps in a whole new validated
/// value, never mutates in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ipmi: IpmiConfig,
    pub thresholds: Thresholds,
    pub fan_speeds: FanSpeeds,
    #[serde(default)]
    pub static_peripheral: StaticPeripheral,
    pub polling: PollingConfig,
    pub alerts: AlertConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub zones: Vec<ZoneConfig>,
}

impl Config {
    /// Run all semantic validation rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let th = &self.thresholds;
        if !(th.moderate < th.high && th.high < th.emergency) {
            return Err(ConfigError::Validation(format!(
                "thresholds must satisfy moderate < high < emergency \
                 (got {} / {} / {})",
                th.moderate, th.high, th.emergency
            )));
        }

        if self.polling.normal_secs == 0 || self.polling.high_load_secs == 0 {
            return Err(ConfigError::Validation(
                "polling intervals must be non-zero".into(),
            ));
        }

        if self.alerts.high_load_event_threshold == 0 {
            return Err(ConfigError::Validation(
                "high_load_event_threshold must be at least 1".into(),
            ));
        }

        if self.telemetry.history_size == 0 {
            return Err(ConfigError::Validation(
                "telemetry history_size must be non-zero".into(),
            ));
        }

        if self.zones.is_empty() {
            return Err(ConfigError::Validation(
                "at least one fan zone must be configured".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for zone in &self.zones {
            if zone.name.is_empty() {
                return Err(ConfigError::Validation("zone name is empty".into()));
            }
            if !seen.insert(zone.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate zone name '{}'",
                    zone.name
                )));
            }
        }

        Ok(())
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the daemon configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&raw)
}

/// Load config from a TOML string (also used by tests).
pub fn load_config_from_str(raw: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
