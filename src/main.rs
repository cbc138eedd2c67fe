//! Load frame control - Main Entry Point
//!
//! Commands:
//! - `monitor [--duration <s>]` - print live load and extension readings
//! - `record --duration <s> [--direction up|down] [--run-rate <r>] [--output <csv>]` -
//!   record a run and export it as CSV
//! - `command <up|down|stop|zero-load|zero-extension|run-rate <r>> [--hold <s>]` -
//!   send one command
//! - `range` - print the rated range of the fitted load cell
//! - `init` - write a default configuration file
//!
//! The crosshead is always stopped when the session closes, including on
//! Ctrl-C or SIGTERM.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use loadframe_rs::{
    config::{self, AppConfig, AppState},
    device::{self, open_session, DeviceFamily, DeviceOptions, LoadFrame},
    logging,
    run::default_export_name,
    shutdown::ShutdownSignal,
    station::{DeviceCommand, Station, StationMessage, StationReceiver},
    transport::SimulatedLoadFrame,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "loadframe")]
#[command(about = "Control and sample Tinius Olsen load frames over RS232")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to loadframe.toml in the data directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overriding the configuration and the last used port
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Controller family (h5k or 1000)
    #[arg(short, long, global = true)]
    family: Option<DeviceFamily>,

    /// Talk to an in-process simulated controller instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Sample rate in Hz, overriding the configuration
    #[arg(short, long, global = true)]
    rate: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print live readings
    Monitor {
        /// Stop after this many seconds (runs until killed otherwise)
        #[arg(short, long)]
        duration: Option<f64>,
    },
    /// Record a run and export it as CSV
    Record {
        /// Length of the run in seconds
        #[arg(short, long)]
        duration: f64,

        /// Move the crosshead during the run
        #[arg(long, value_enum)]
        direction: Option<Direction>,

        /// Crosshead run rate to set before moving
        #[arg(long)]
        run_rate: Option<f64>,

        /// Output file (defaults to a timestamped name in the export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Send a single command to the controller
    Command {
        #[command(subcommand)]
        action: Action,

        /// Keep the session open this many seconds before stopping and closing
        #[arg(long, default_value_t = 0.0, global = true)]
        hold: f64,
    },
    /// Print the rated range of the fitted load cell
    Range,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum Action {
    /// Start moving the crosshead up
    Up,
    /// Start moving the crosshead down
    Down,
    /// Stop the crosshead
    Stop,
    /// Zero the load reading
    ZeroLoad,
    /// Zero the extension reading
    ZeroExtension,
    /// Set the crosshead run rate
    RunRate { rate: f64 },
}

impl From<Action> for DeviceCommand {
    fn from(action: Action) -> Self {
        match action {
            Action::Up => DeviceCommand::MoveUp,
            Action::Down => DeviceCommand::MoveDown,
            Action::Stop => DeviceCommand::Stop,
            Action::ZeroLoad => DeviceCommand::ZeroLoad,
            Action::ZeroExtension => DeviceCommand::ZeroExtension,
            Action::RunRate { rate } => DeviceCommand::SetRunRate(rate),
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        return write_default_config(cli.config, force);
    }

    let config = AppConfig::load_or_default(cli.config.as_deref());
    let _log_guard = logging::init(&config.logging)?;

    tracing::info!("Starting loadframe v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.install_handlers() {
        tracing::warn!("Running without signal handlers: {}", e);
    }

    let options = config.device.options()?;
    let mut app_state = AppState::load_or_default();
    let (name, family, device) = open_device(&cli, &config, &app_state, &options)?;

    let rate_hz = cli.rate.unwrap_or(config.sampling.sample_rate_hz);
    if !cli.simulate {
        app_state.update_last_connection(&name, family);
    }
    let result = match cli.command {
        Commands::Monitor { duration } => {
            let (mut station, receiver) = Station::new(options);
            station.set_sample_rate(rate_hz)?;
            if config.sampling.collect_on_start {
                station.start_collecting();
            }
            station.attach(&name, device)?;
            pump(&receiver, duration.map(seconds).transpose()?, true, &shutdown);
            station.disconnect();
            Ok(())
        }
        Commands::Record {
            duration,
            direction,
            run_rate,
            output,
        } => {
            let (mut station, receiver) = Station::new(options);
            station.set_sample_rate(rate_hz)?;
            station.start_collecting();
            station.attach(&name, device)?;

            if let Some(rate) = run_rate {
                station.execute(DeviceCommand::SetRunRate(rate))?;
            }
            match direction {
                Some(Direction::Up) => station.execute(DeviceCommand::MoveUp)?,
                Some(Direction::Down) => station.execute(DeviceCommand::MoveDown)?,
                None => {}
            }

            pump(&receiver, Some(seconds(duration)?), false, &shutdown);
            station.disconnect();

            let path = output.unwrap_or_else(|| {
                config
                    .export
                    .path_for(&default_export_name(&chrono::Local::now()))
            });
            let rows = station.export_csv(&path)?;
            println!("Recorded {} samples to {}", rows, path.display());
            Ok(())
        }
        Commands::Command { action, hold } => {
            let command = DeviceCommand::from(action);
            if command.is_slow_on(device.as_ref()) {
                println!(
                    "Zeroing; this takes about {:.0} s",
                    options.zero_settle.as_secs_f64()
                );
            }
            command.apply(device.as_ref())?;
            println!("{} on {}", command, device.describe());
            shutdown.sleep(seconds(hold)?);
            device.disconnect()?;
            Ok(())
        }
        Commands::Range => {
            let code = device.read_load_cell_type()?;
            let range = device.get_load_cell_range()?;
            println!("Load cell type {}: {} N", code, range);
            device.disconnect()?;
            Ok(())
        }
        Commands::Init { .. } => Ok(()),
    };

    if let Err(e) = app_state.save() {
        tracing::warn!("Failed to save app state: {}", e);
    }

    tracing::info!("loadframe shutdown complete");
    result
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid duration {}", secs))
}

/// Open the configured serial port, or a simulator
fn open_device(
    cli: &Cli,
    config: &AppConfig,
    app_state: &AppState,
    options: &DeviceOptions,
) -> Result<(String, DeviceFamily, Arc<dyn LoadFrame>)> {
    if cli.simulate {
        let family = cli.family.unwrap_or(config.device.family);
        tracing::info!("Using simulated {} controller", family);
        let simulator = SimulatedLoadFrame::new(family);
        return Ok((
            "simulator".to_string(),
            family,
            open_session(family, Box::new(simulator), options),
        ));
    }

    let target = app_state.connection_target(cli.port.as_deref(), cli.family, &config.device);
    let Some(port) = target.port else {
        bail!("No serial port given; use --port or set device.port in the configuration");
    };
    let family = target.family;

    let device = device::connect(&port, family, options)
        .with_context(|| format!("Failed to connect to {} controller on {}", family, port))?;
    Ok((port, family, device))
}

/// Report station messages until `duration` has passed (forever when `None`)
/// or shutdown is requested
fn pump(
    receiver: &StationReceiver,
    duration: Option<Duration>,
    print_readings: bool,
    shutdown: &ShutdownSignal,
) {
    let started = Instant::now();
    loop {
        if shutdown.is_requested() {
            eprintln!("Interrupted; stopping the crosshead");
            break;
        }
        let wait = match duration {
            Some(duration) => match duration.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining.min(Duration::from_millis(200)),
                _ => break,
            },
            None => Duration::from_millis(200),
        };

        let Some(msg) = receiver.recv_timeout(wait) else {
            continue;
        };
        match msg {
            StationMessage::Reading(reading) if print_readings => {
                println!(
                    "{:>10.3} s  {:>12.2} N  {:>10.3} mm{}",
                    reading.timestamp.as_secs_f64(),
                    reading.load,
                    reading.extension,
                    if reading.recorded { "  *" } else { "" }
                );
            }
            StationMessage::LoadCellRange(range) => println!("Load cell range: {} N", range),
            StationMessage::ReadError(error) => eprintln!("Read failed: {}", error),
            StationMessage::CommandFailed { command, error } => {
                eprintln!("{} failed: {}", command, error)
            }
            StationMessage::Redraw { samples } if !print_readings && samples % 100 == 0 => {
                println!("{} samples recorded", samples);
            }
            _ => {}
        }
    }
}

fn write_default_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => config::config_path().context("Could not determine the data directory")?,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    AppConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pump_returns_on_shutdown_request() {
        let (_station, receiver) = Station::new(DeviceOptions::default());
        let shutdown = ShutdownSignal::new();
        let requester = shutdown.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            requester.request();
        });

        let started = Instant::now();
        pump(&receiver, None, false, &shutdown);
        assert!(started.elapsed() < Duration::from_secs(2));
        thread.join().unwrap();
    }

    #[test]
    fn test_pump_runs_for_duration() {
        let (_station, receiver) = Station::new(DeviceOptions::default());
        let started = Instant::now();
        pump(&receiver, Some(Duration::from_millis(250)), false, &ShutdownSignal::new());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
