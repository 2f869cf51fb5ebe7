//! Observatory control binary.
//!
//! Runs one night with the configured hardware, or prints the current
//! schedule without moving anything.
//!
//! # Usage
//!
//! ```bash
//! # Run the nightly state machine
//! OBSCTL_CONFIG=config/obsctl.toml cargo run --bin obsctl
//!
//! # Print the ranked schedule as JSON
//! cargo run --bin obsctl -- schedule
//! ```
//!
//! # Environment Variables
//!
//! - `OBSCTL_CONFIG`: Configuration file (default: first `obsctl.toml` in the standard locations)
//! - `OBSCTL_STOP_FILE`: Creating this file also ends the night (for unattended hosts)
//! - `RUST_LOG`: Log level (default: info)
//!
//! Ctrl+C ends the night through the safe state: the mount is parked and
//! housekeeping runs before the process exits. A second Ctrl+C is ignored.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use obsctl::config::ObservatoryConfig;
use obsctl::state::{LogNotifier, StopSignal};

const STOP_FILE_POLL: Duration = Duration::from_secs(1);

fn load_config() -> anyhow::Result<ObservatoryConfig> {
    let config = match env::var("OBSCTL_CONFIG") {
        Ok(path) => ObservatoryConfig::from_file(&path)?,
        Err(_) => ObservatoryConfig::from_default_location()?,
    };
    Ok(config)
}

fn on_interrupt(stop: &StopSignal) {
    if !stop.is_raised() {
        info!("Ctrl+C received, ending the night through the safe state");
        stop.raise();
    }
}

/// Routes Ctrl+C to the engine's stop signal instead of killing the process.
fn install_interrupt_handler(stop: StopSignal) {
    if let Err(e) = ctrlc::set_handler(move || on_interrupt(&stop)) {
        warn!("Failed to set Ctrl+C handler: {}", e);
    }
}

/// Raises `stop` once `path` exists. Exits when `done` is set.
fn watch_stop_file(path: PathBuf, stop: StopSignal, done: Arc<AtomicBool>) {
    thread::spawn(move || {
        while !done.load(Ordering::SeqCst) {
            if path.exists() {
                info!("Stop file {} found", path.display());
                stop.raise();
                return;
            }
            thread::sleep(STOP_FILE_POLL);
        }
    });
}

fn print_schedule(config: &ObservatoryConfig) -> anyhow::Result<()> {
    let mut scheduler = config.build_scheduler()?;
    let ranked = scheduler.get_observation(None, true, false)?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

fn run_night(config: &ObservatoryConfig) -> anyhow::Result<()> {
    let mut scheduler = config.build_scheduler()?;
    let mut observatory = config.build_observatory();
    let machine = config.build_state_machine()?;

    install_interrupt_handler(machine.stop_signal());

    let done = Arc::new(AtomicBool::new(false));
    if let Ok(path) = env::var("OBSCTL_STOP_FILE") {
        watch_stop_file(PathBuf::from(path), machine.stop_signal(), Arc::clone(&done));
    }

    let result = machine.run(&mut scheduler, &mut observatory, &LogNotifier);
    done.store(true, Ordering::SeqCst);

    let summary = result?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    let config = load_config()?;
    info!(
        "Loaded configuration for {} ({}, {})",
        config.location.name, config.location.latitude, config.location.longitude
    );

    match env::args().nth(1).as_deref() {
        Some("schedule") => print_schedule(&config),
        None | Some("run") => run_night(&config),
        Some(other) => anyhow::bail!("Unknown command `{}` (expected `run` or `schedule`)", other),
    }
}
