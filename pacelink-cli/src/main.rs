mod monitor;
mod ports;
mod program;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use pacelink_lib::SessionConfig;
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Program a pacemaker over its serial link and watch its egram.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and whether they pass the configured filters
    Ports(LinkArgs),
    /// Send the stored parameters of a user's active mode
    Program(program::ProgramArgs),
    /// Stream egram samples until interrupted (Ctrl+C)
    Monitor(monitor::MonitorArgs),
}

/// Link settings shared by every command
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// JSON file with session settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial port to use instead of the first one that opens
    #[arg(short, long)]
    port: Option<String>,
    /// USB vendor id filter, hex (e.g. 1366)
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,
    /// USB product id filter, hex (e.g. 1015)
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,
    /// How long to wait for the device to echo a parameter frame
    #[arg(long)]
    echo_timeout_ms: Option<u64>,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| format!("invalid hex id {:?}: {}", s, e))
}

impl LinkArgs {
    pub fn session_config(&self) -> Result<SessionConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::default(),
        };
        if let Some(port) = &self.port {
            config = config.with_port(port.clone());
        }
        if self.vid.is_some() {
            config.vendor_id = self.vid;
        }
        if self.pid.is_some() {
            config.product_id = self.pid;
        }
        if let Some(ms) = self.echo_timeout_ms {
            config = config.with_echo_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

fn setup_logging(
    log_file_path: Option<PathBuf>,
    verbosity: &Verbosity<InfoLevel>,
) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).map_err(|e| format!("Failed to create log file at {:?}: {}", path, e))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v, TRACE with -vv; RUST_LOG still wins
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file, &cli.verbose)?;

    let result = match cli.command {
        Command::Ports(args) => ports::run(&args),
        Command::Program(args) => program::run(&args).await,
        Command::Monitor(args) => monitor::run(&args).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
