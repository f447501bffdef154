use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod serve;
pub mod track;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Act as a tracker: log in and report a fixed position periodically.
    Track(TrackArgs),
    /// Accept one tracker connection and print every frame it sends.
    Serve(ServeArgs),
    /// Print the hex encoding of a single frame.
    #[command(subcommand)]
    Encode(EncodeCommand),
    /// Scan a hex byte string and print every valid frame in it.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Track(args) => track::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Encode(command) => encode::run(command, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct PositionArgs {
    /// Latitude in decimal degrees (south negative).
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,
    /// Longitude in decimal degrees (west negative).
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,
    /// Speed in km/h.
    #[arg(long, default_value_t = 0.0)]
    pub speed: f32,
    /// Horizontal accuracy in metres (not transmitted).
    #[arg(long, default_value_t = 0.0)]
    pub accuracy: f32,
    /// Altitude in metres (not transmitted).
    #[arg(long, default_value_t = 0.0)]
    pub altitude: f32,
}

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Tracking server (host:port; port defaults to 5023).
    #[arg(env = "GT06_SERVER")]
    pub server: String,
    /// Device identifier (up to 15 digits).
    #[arg(long, env = "GT06_DEVICE_ID")]
    pub device_id: String,
    #[command(flatten)]
    pub position: PositionArgs,
    /// Interval between location reports (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub interval: String,
    /// Stop after N location reports.
    #[arg(long)]
    pub count: Option<usize>,
    /// Connect timeout (e.g. 10s).
    #[arg(long, default_value = "10s")]
    pub connect_timeout: String,
    /// Relay controller device; commands are only logged when absent.
    #[arg(long, value_name = "PATH")]
    pub relay: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (host:port).
    pub bind: String,
    /// Command text to send once the device has logged in.
    #[arg(long)]
    pub command: Option<String>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum EncodeCommand {
    /// Login frame for a device identifier.
    Login {
        device_id: String,
        #[arg(long, default_value_t = 1)]
        sequence: u16,
    },
    /// Location frame stamped with the current UTC time.
    Location {
        #[command(flatten)]
        position: PositionArgs,
        #[arg(long, default_value_t = 1)]
        sequence: u16,
    },
    /// Server-to-device command frame.
    Command {
        text: String,
        #[arg(long, default_value_t = 1)]
        sequence: u16,
    },
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes; whitespace and ':' separators are ignored.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
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

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("fast").unwrap_err().code, USAGE);
    }
}
