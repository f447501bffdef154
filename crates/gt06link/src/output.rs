use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gt06link_frame::{
    FixTime, Frame, TelemetrySample, PROTOCOL_COMMAND, PROTOCOL_LOCATION, PROTOCOL_LOGIN,
};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Protocol-specific view of a decoded frame.
#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameDetail {
    Login {
        device_id: String,
    },
    Location {
        time: String,
        satellites: u8,
        latitude: f64,
        longitude: f64,
        speed_kmh: u8,
        course_status: u16,
    },
    Command {
        text: String,
    },
    Other,
    Invalid {
        error: String,
    },
}

impl FrameDetail {
    pub fn of(frame: &Frame) -> Self {
        let detail = match frame.protocol {
            PROTOCOL_LOGIN => frame
                .device_id()
                .map(|device_id| FrameDetail::Login { device_id }),
            PROTOCOL_LOCATION => frame.location().map(|report| FrameDetail::Location {
                time: fix_time(report.time),
                satellites: report.satellites,
                latitude: report.latitude,
                longitude: report.longitude,
                speed_kmh: report.speed,
                course_status: report.course_status,
            }),
            PROTOCOL_COMMAND => frame.command_text().map(|text| FrameDetail::Command { text }),
            _ => Ok(FrameDetail::Other),
        };
        detail.unwrap_or_else(|err| FrameDetail::Invalid {
            error: err.to_string(),
        })
    }

    fn summary(&self) -> String {
        match self {
            FrameDetail::Login { device_id } => format!("device_id={device_id}"),
            FrameDetail::Location {
                time,
                latitude,
                longitude,
                speed_kmh,
                ..
            } => format!("{time} lat={latitude:.6} lon={longitude:.6} speed={speed_kmh}"),
            FrameDetail::Command { text } => format!("text={text:?}"),
            FrameDetail::Other => "-".to_string(),
            FrameDetail::Invalid { error } => format!("invalid: {error}"),
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    protocol: u8,
    protocol_name: &'a str,
    sequence: u16,
    wire_size: usize,
    payload_hex: String,
    detail: FrameDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<&'a str>,
    timestamp: i64,
}

pub fn print_frame(frame: &Frame, peer: Option<&str>, format: OutputFormat) {
    let detail = FrameDetail::of(frame);
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                protocol: frame.protocol,
                protocol_name: protocol_name(frame.protocol),
                sequence: frame.sequence,
                wire_size: frame.wire_size(),
                payload_hex: to_hex(frame.payload.as_ref()),
                detail,
                peer,
                timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "SEQ", "SIZE", "PEER", "DETAIL"])
                .add_row(vec![
                    protocol_name(frame.protocol).to_string(),
                    frame.sequence.to_string(),
                    frame.wire_size().to_string(),
                    peer.unwrap_or("-").to_string(),
                    detail.summary(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "protocol=0x{:02x} ({}) seq={} size={} {}",
                frame.protocol,
                protocol_name(frame.protocol),
                frame.sequence,
                frame.wire_size(),
                detail.summary()
            );
        }
        OutputFormat::Raw => print_raw(frame.payload.as_ref()),
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    protocol_name: &'a str,
    sequence: u16,
    size: usize,
    hex: String,
}

/// Print a freshly encoded frame.
pub fn print_encoded(protocol: u8, sequence: u16, bytes: &[u8], format: OutputFormat) {
    let hex = to_hex(bytes);
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                protocol_name: protocol_name(protocol),
                sequence,
                size: bytes.len(),
                hex,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "SEQ", "SIZE", "HEX"])
                .add_row(vec![
                    protocol_name(protocol).to_string(),
                    sequence.to_string(),
                    bytes.len().to_string(),
                    hex,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
        OutputFormat::Raw => print_raw(bytes),
    }
}

#[derive(Serialize)]
struct ReportOutput {
    sequence: u16,
    time: String,
    latitude: f64,
    longitude: f64,
    speed_kmh: f32,
    accuracy_m: f32,
    altitude_m: f32,
}

/// Print one location report sent by the tracker.
pub fn print_report(sequence: u16, sample: &TelemetrySample, format: OutputFormat) {
    let out = ReportOutput {
        sequence,
        time: fix_time(sample.time),
        latitude: sample.latitude,
        longitude: sample.longitude,
        speed_kmh: sample.speed,
        accuracy_m: sample.accuracy,
        altitude_m: sample.altitude,
    };
    match format {
        OutputFormat::Json | OutputFormat::Raw => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "TIME", "LAT", "LON", "SPEED"])
                .add_row(vec![
                    out.sequence.to_string(),
                    out.time.clone(),
                    format!("{:.6}", out.latitude),
                    format!("{:.6}", out.longitude),
                    format!("{:.1}", out.speed_kmh),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "seq={} {} lat={:.6} lon={:.6} speed={:.1}",
            out.sequence, out.time, out.latitude, out.longitude, out.speed_kmh
        ),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn protocol_name(protocol: u8) -> &'static str {
    match protocol {
        PROTOCOL_LOGIN => "LOGIN",
        PROTOCOL_LOCATION => "LOCATION",
        PROTOCOL_COMMAND => "COMMAND",
        _ => "OTHER",
    }
}

fn fix_time(time: FixTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        2000 + u16::from(time.year),
        time.month,
        time.day,
        time.hour,
        time.minute,
        time.second
    )
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Parse a hex string. Whitespace and `:` separators are ignored.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| "non-ASCII input".to_string())?;
            u8::from_str_radix(text, 16).map_err(|_| format!("invalid hex byte {text:?}"))
        })
        .collect()
}
