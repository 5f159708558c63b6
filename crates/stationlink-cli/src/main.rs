//! StationLink - serial acquisition from the command line
//!
//! ```text
//! stationlink [-e] [--protocol weather|nozzle] [--output-dir D] [--config F]
//!             [--demo] [-v] [<port> [<speed>]]
//! ```

mod output;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use stationlink_core::acquisition::{Acquisition, AcquisitionConfig, Protocol};
use stationlink_core::datalog::FileSink;
use stationlink_core::demo::simulated_device;
use stationlink_core::transport::platform::{NativeSerial, PlatformSerial};
use stationlink_core::transport::{list_ports, SerialTransport};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Read a weather station or nozzle controller and append its samples to a file
#[derive(Parser, Debug)]
#[command(name = "stationlink", version, long_about = None)]
struct Args {
    /// List available serial ports and exit
    #[arg(short = 'e', long = "enumerate")]
    enumerate: bool,

    /// Instrument protocol (weather or nozzle)
    #[arg(long)]
    protocol: Option<Protocol>,

    /// Folder receiving the output file
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// JSON acquisition config; positional arguments override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to a simulated instrument instead of a serial port
    #[arg(long)]
    demo: bool,

    /// Print N received bytes as a hex dump and exit
    #[arg(long, value_name = "N")]
    dump: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Serial port (defaults to the protocol's usual port)
    port: Option<String>,

    /// Baud rate; anything that is not a positive number keeps the default
    speed: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.enumerate {
        print_ports();
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        println!("{}", port);
    }
}

/// Build the acquisition config from the optional file and the arguments
fn resolve_config(args: &Args) -> Result<AcquisitionConfig> {
    let mut config = match &args.config {
        Some(path) => match args.protocol {
            Some(protocol) => AcquisitionConfig::from_file_with_protocol(path, protocol)?,
            None => AcquisitionConfig::from_file(path)?,
        },
        None => AcquisitionConfig::for_protocol(args.protocol.unwrap_or_default()),
    };

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(speed) = &args.speed {
        config.serial.baud_rate = match speed.parse::<u32>() {
            Ok(baud) if baud > 0 => baud,
            _ => {
                let fallback = config.protocol.default_baud_rate();
                tracing::warn!("invalid speed '{}', using {} bps", speed, fallback);
                fallback
            }
        };
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = resolve_config(args)?;
    let platform: Box<dyn PlatformSerial> = if args.demo {
        tracing::info!("Demo mode: simulated {} instrument", config.protocol);
        Box::new(simulated_device(config.protocol, None))
    } else {
        Box::new(NativeSerial)
    };

    if let Some(count) = args.dump {
        return dump(config, platform, count);
    }

    let path = output::output_path(&args.output_dir, config.protocol, Local::now().date_naive());
    let sink = FileSink::open(&path)
        .with_context(|| format!("Can't open the output file {}", path.display()))?;
    tracing::info!("Writing records to {}", path.display());

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, stopping...");
        handler_token.cancel();
    })
    .context("Can't install the interrupt handler")?;

    let port = config.serial.port.clone();
    let mut acquisition = Acquisition::with_platform(config, sink, platform)
        .context("Invalid acquisition settings")?;
    let stats = acquisition
        .run(&cancel)
        .with_context(|| format!("Acquisition on {} failed", port))?;

    tracing::info!(
        "{} samples from {} lines ({} ignored, {} decode errors)",
        stats.samples,
        stats.lines,
        stats.ignored,
        stats.decode_errors
    );
    Ok(())
}

fn dump(config: AcquisitionConfig, platform: Box<dyn PlatformSerial>, count: usize) -> Result<()> {
    let port = config.serial.port.clone();
    let transport = SerialTransport::with_platform(config.serial, platform);
    transport
        .open()
        .with_context(|| format!("Can't open {}", port))?;
    for line in transport.dump(count)? {
        println!("{}", line);
    }
    transport.close();
    Ok(())
}
