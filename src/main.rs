//! # fanctld daemon entrypoint
//!
//! Loads and validates the TOML configuration (fatal on failure),
//! wires the `ipmitool` transport into the control loop, installs a
//! shutdown handler that lets the current tick finish, and runs until
//! signalled.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use fanctld::config::load_config;
use fanctld::cycle::CycleRunner;
use fanctld::hal::ipmi::IpmiTool;
use fanctld::shared::{ConfigHandle, StatusCell};
use fanctld::telemetry::TelemetryHandle;
use fanctld::watchdog::SdNotify;

/// fanctld — IPMI fan control daemon for SuperMicro servers
#[derive(Parser, Debug)]
#[command(name = "fanctld")]
#[command(version)]
#[command(about = "Thermal control and alerting daemon (IPMI fan control)")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(default_value = "config/fanctld.toml")]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    /// Log fan-speed decisions without issuing IPMI commands.
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("fanctld v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    };
    info!(
        "config OK: {} zones, polling {}s/{}s (normal/high-load)",
        config.zones.len(),
        config.polling.normal_secs,
        config.polling.high_load_secs,
    );

    let ipmi = IpmiTool::new(&config.ipmi);
    let telemetry = TelemetryHandle::new(config.telemetry.history_size);
    let handle = ConfigHandle::new(config);
    let status = StatusCell::new();
    let notify = SdNotify::from_env();
    if notify.is_enabled() {
        info!("systemd notify socket detected, watchdog enabled");
    }
    if args.dry_run {
        info!("dry-run mode: no IPMI fan commands will be issued");
    }

    // Shutdown lets the current tick finish; the flag is only
    // checked between ticks.
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        error!("FATAL: cannot install signal handler: {e}");
        process::exit(1);
    }

    let mut runner = CycleRunner::new(
        handle,
        Box::new(ipmi.clone()),
        Box::new(ipmi),
        telemetry,
        status,
        notify,
        running,
        args.dry_run,
    );
    runner.run();

    info!("fanctld shutdown complete");
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
