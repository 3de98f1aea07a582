use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read messages from the serial port until interrupted.
    Listen(ListenArgs),
    /// Run a captured byte stream through the pipeline.
    Replay(ReplayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format).await,
        Command::Replay(args) => replay::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// JSON service configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Serial device path (overrides serial_port.location).
    #[arg(long, value_name = "PATH", env = "HEIZWIRE_PORT")]
    pub port: Option<PathBuf>,
    /// Baud rate (overrides serial_port.baud_rate).
    #[arg(long, value_name = "N", env = "HEIZWIRE_BAUD")]
    pub baud: Option<u32>,
    /// Grace period after the first interrupt before the session is abandoned (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub shutdown_timeout: String,
    /// Reopen the device after this delay when a session ends on its own.
    #[arg(long, value_name = "DURATION")]
    pub reconnect_delay: Option<String>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Capture file holding raw serial bytes.
    pub file: PathBuf,
    /// Message terminator (default: ";22;1;%;").
    #[arg(long)]
    pub terminator: Option<String>,
    /// Maximum message size in bytes, terminator included.
    #[arg(long, value_name = "N")]
    pub max_message_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
