//! `ipmitool`-backed sensor reader and fan actuator.
//!
//! Every operation shells out to `ipmitool -I lanplus` against the
//! configured BMC. Invocations are bounded by the configured timeout;
//! an overrun kills the child and surfaces as `HalError::Timeout`.
//!
//! Fan actuation uses the SuperMicro raw command
//! `0x30 0x70 0x66 0x01 <zone> <duty>`, where the duty byte is the
//! percentage (0x00–0x64).

use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::IpmiConfig;
use crate::control::band::Duty;
use crate::hal::{FanActuator, HalError, SensorReader, SensorRow};

/// Child poll interval while waiting for subprocess exit.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// IPMI transport via the `ipmitool` CLI.
#[derive(Debug, Clone)]
pub struct IpmiTool {
    host: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl IpmiTool {
    pub fn new(config: &IpmiConfig) -> Self {
        Self {
            host: config.host.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout(),
        }
    }

    /// Base command with the lanplus transport and credentials.
    fn command(&self) -> Command {
        let mut cmd = Command::new("ipmitool");
        cmd.args(["-I", "lanplus"])
            .args(["-H", &self.host])
            .args(["-U", &self.username])
            .args(["-P", &self.password]);
        cmd
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<Output, HalError> {
        debug!(command = what, "running ipmitool");
        let output = run_with_timeout(&mut cmd, self.timeout, what)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HalError::Transport(format!(
                "'{what}' exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

impl SensorReader for IpmiTool {
    fn read_temperature(&self, sensor: &str) -> Result<i64, HalError> {
        let mut cmd = self.command();
        cmd.args(["sensor", "get", sensor]);
        let output = self.run(cmd, &format!("sensor get {sensor}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_sensor_reading(&stdout)
            .ok_or_else(|| HalError::Parse(format!("no valid reading for sensor '{sensor}'")))
    }

    fn read_all_sensors(&self) -> Result<Vec<SensorRow>, HalError> {
        let mut cmd = self.command();
        cmd.arg("sensor");
        let output = self.run(cmd, "sensor")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_sensor_table(&stdout))
    }
}

impl FanActuator for IpmiTool {
    fn set_zone_duty(&self, zone_raw_id: u8, duty: Duty) -> Result<(), HalError> {
        let mut cmd = self.command();
        cmd.args(["raw", "0x30", "0x70", "0x66", "0x01"])
            .arg(format!("0x{zone_raw_id:02x}"))
            .arg(format!("0x{:02x}", duty.raw()));
        self.run(cmd, &format!("raw fan zone 0x{zone_raw_id:02x}"))?;
        Ok(())
    }
}

/// Run a command to completion with a hard deadline.
///
/// On overrun the child is killed and reaped before returning.
fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    what: &str,
) -> Result<Output, HalError> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| HalError::Transport(format!("failed to spawn ipmitool: {e}")))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_and_reap(&mut child);
                    return Err(HalError::Timeout {
                        command: what.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(HalError::Transport(format!("wait failed: {e}")));
            }
        }
    }

    child
        .wait_with_output()
        .map_err(|e| HalError::Transport(format!("failed to collect output: {e}")))
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Extract the integer temperature from `ipmitool sensor get` output.
///
/// Looks for the `Sensor Reading` line; the value is reported as a
/// float (e.g. `54.000`) and truncated to whole degrees.
fn parse_sensor_reading(stdout: &str) -> Option<i64> {
    for line in stdout.lines() {
        if !line.contains("Sensor Reading") {
            continue;
        }
        let value = line.split(':').nth(1)?.trim().split_whitespace().next()?;
        return value.parse::<f64>().ok().map(|v| v as i64);
    }
    None
}

/// Parse the pipe-separated `ipmitool sensor` dump into rows.
///
/// Lines with fewer than ten fields are skipped.
fn parse_sensor_table(stdout: &str) -> Vec<SensorRow> {
    let mut rows = Vec::new();
    for line in stdout.lines() {
        if !line.contains('|') {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 10 {
            continue;
        }
        rows.push(SensorRow {
            name: parts[0].to_string(),
            value: parts[1].to_string(),
            unit: parts[2].to_string(),
            status: parts[3].to_string(),
            lower_nr: parts[4].to_string(),
            lower_c: parts[5].to_string(),
            lower_nc: parts[6].to_string(),
            upper_nc: parts[7].to_string(),
            upper_c: parts[8].to_string(),
            upper_nr: parts[9].to_string(),
        });
    }
    rows
}
