use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::bcd::{decode_bcd, encode_bcd, BCD_LEN};
use crate::crc::checksum;
use crate::error::{FrameError, Result};
use crate::telemetry::{FixTime, LocationReport, TelemetrySample, COORDINATE_SCALE};

/// Start marker (0x78 0x78).
pub const START_MARKER: [u8; 2] = [0x78, 0x78];

/// Stop marker (CR LF).
pub const STOP_MARKER: [u8; 2] = [0x0D, 0x0A];

/// Frame header: start marker (2) + length (1) + protocol (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Login message.
pub const PROTOCOL_LOGIN: u8 = 0x01;
/// GPS location message.
pub const PROTOCOL_LOCATION: u8 = 0x12;
/// Server → device command message.
pub const PROTOCOL_COMMAND: u8 = 0x80;

/// Total wire size of a login frame.
pub const LOGIN_FRAME_LEN: usize = 22;
/// Total wire size of a location frame.
pub const LOCATION_FRAME_LEN: usize = 28;

/// Bytes counted by the length field besides the payload: protocol (1),
/// sequence (2), CRC (2).
const LENGTH_OVERHEAD: usize = 5;
/// Bytes not counted by the length field: start marker (2), length (1),
/// stop marker (2).
const FRAME_OVERHEAD: usize = 5;
/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - LENGTH_OVERHEAD;

/// Extended login fields: terminal type code and timezone/language word.
/// Zero means unspecified model and UTC.
const LOGIN_TYPE_CODE: u16 = 0x0000;
const LOGIN_TIMEZONE_LANGUAGE: u16 = 0x0000;

/// Satellite count / GPS info length byte sent with every location.
const SATELLITE_BYTE: u8 = 0xCC;
const LOCATION_PAYLOAD_LEN: usize = 18;

/// A frame received or built on the wire, without marker/length/CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol number (login, location, command, ...).
    pub protocol: u8,
    /// Bytes between the protocol number and the sequence number.
    pub payload: Bytes,
    /// Frame sequence number.
    pub sequence: u16,
}

impl Frame {
    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + LENGTH_OVERHEAD + self.payload.len()
    }

    /// Text of a command frame. Invalid UTF-8 is replaced, not rejected.
    pub fn command_text(&self) -> Result<String> {
        self.expect_protocol(PROTOCOL_COMMAND)?;
        Ok(String::from_utf8_lossy(&self.payload).into_owned())
    }

    /// Identifier carried by a login frame (15 digits, padded).
    pub fn device_id(&self) -> Result<String> {
        self.expect_protocol(PROTOCOL_LOGIN)?;
        let bcd: [u8; BCD_LEN] = self
            .payload
            .get(..BCD_LEN)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(FrameError::MalformedFrame("login payload shorter than identifier"))?;
        decode_bcd(&bcd)
    }

    /// Decode a location payload.
    pub fn location(&self) -> Result<LocationReport> {
        self.expect_protocol(PROTOCOL_LOCATION)?;
        let p = self.payload.as_ref();
        if p.len() < LOCATION_PAYLOAD_LEN {
            return Err(FrameError::MalformedFrame("location payload too short"));
        }

        let time = FixTime::from_bytes([p[0], p[1], p[2], p[3], p[4], p[5]]);
        let latitude = i32::from_be_bytes([p[7], p[8], p[9], p[10]]);
        let longitude = i32::from_be_bytes([p[11], p[12], p[13], p[14]]);

        Ok(LocationReport {
            time,
            satellites: p[6],
            latitude: f64::from(latitude) / COORDINATE_SCALE,
            longitude: f64::from(longitude) / COORDINATE_SCALE,
            speed: p[15],
            course_status: u16::from_be_bytes([p[16], p[17]]),
        })
    }

    fn expect_protocol(&self, expected: u8) -> Result<()> {
        if self.protocol == expected {
            Ok(())
        } else {
            Err(FrameError::UnexpectedProtocol {
                expected,
                actual: self.protocol,
            })
        }
    }
}

/// Outcome of decoding at a candidate offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decode<T> {
    /// A frame was decoded; `span` bytes from the offset belong to it.
    Complete { value: T, span: usize },
    /// The bytes so far are a valid prefix; wait for more.
    Incomplete,
    /// No frame of the requested kind starts at this offset.
    NotAFrame,
}

/// Write one frame, back-patching the length byte once the payload span is
/// known. Returns the number of bytes written.
fn put_frame(
    dst: &mut BytesMut,
    protocol: u8,
    sequence: u16,
    payload: impl FnOnce(&mut BytesMut),
) -> usize {
    let start = dst.len();
    dst.put_slice(&START_MARKER);
    let length_pos = dst.len();
    dst.put_u8(0);
    dst.put_u8(protocol);
    payload(dst);
    dst.put_u16(sequence);

    // protocol..sequence already written, CRC still to come.
    let counted = dst.len() - length_pos - 1 + 2;
    debug_assert!(counted <= u8::MAX as usize);
    dst[length_pos] = counted as u8;

    let crc = checksum(&dst[length_pos..]);
    dst.put_u16(crc);
    dst.put_slice(&STOP_MARKER);
    dst.len() - start
}

/// Encode a login frame.
///
/// Wire format (22 bytes):
/// ```text
/// ┌───────┬─────┬──────┬───────────┬──────┬───────┬──────┬──────┬───────┐
/// │ 78 78 │ 11  │  01  │ IMEI BCD  │ type │ tz/   │ seq  │ CRC  │ 0D 0A │
/// │       │ len │ prot │ (8B)      │ (2B) │ lang  │ (2B) │ (2B) │       │
/// └───────┴─────┴──────┴───────────┴──────┴───────┴──────┴──────┴───────┘
/// ```
pub fn encode_login(device_id: &str, sequence: u16, dst: &mut BytesMut) -> Result<()> {
    let bcd = encode_bcd(device_id)?;
    dst.reserve(LOGIN_FRAME_LEN);
    put_frame(dst, PROTOCOL_LOGIN, sequence, |dst| {
        dst.put_slice(&bcd);
        dst.put_u16(LOGIN_TYPE_CODE);
        dst.put_u16(LOGIN_TIMEZONE_LANGUAGE);
    });
    Ok(())
}

/// Encode a location frame and return the number of bytes written.
///
/// Payload: date/time (6), satellites (1), latitude (4, i32), longitude
/// (4, i32), speed (1), course/status (2). Coordinates are degrees scaled
/// by [`COORDINATE_SCALE`] and truncated toward zero.
pub fn encode_location(sample: &TelemetrySample, sequence: u16, dst: &mut BytesMut) -> usize {
    let latitude = scale_coordinate(sample.latitude);
    let longitude = scale_coordinate(sample.longitude);
    let speed = speed_byte(sample.speed);

    dst.reserve(LOCATION_FRAME_LEN);
    put_frame(dst, PROTOCOL_LOCATION, sequence, |dst| {
        dst.put_slice(&sample.time.to_bytes());
        dst.put_u8(SATELLITE_BYTE);
        dst.put_i32(latitude);
        dst.put_i32(longitude);
        dst.put_u8(speed);
        dst.put_u16(0x0000);
    })
}

/// Encode a server → device command frame carrying `text`.
pub fn encode_command(text: &str, sequence: u16, dst: &mut BytesMut) -> Result<()> {
    if text.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: text.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(FRAME_OVERHEAD + LENGTH_OVERHEAD + text.len());
    put_frame(dst, PROTOCOL_COMMAND, sequence, |dst| {
        dst.put_slice(text.as_bytes())
    });
    Ok(())
}

fn scale_coordinate(degrees: f64) -> i32 {
    // `as` truncates toward zero and saturates out-of-range values.
    (degrees * COORDINATE_SCALE) as i32
}

fn speed_byte(speed: f32) -> u8 {
    let whole = speed as i32;
    if !(0..=i32::from(u8::MAX)).contains(&whole) {
        warn!(speed, "speed outside 0..=255, wire value wraps");
    }
    whole as u8
}

/// Check the start marker and length byte at `offset`.
///
/// Returns the length byte, the protocol number and the full frame span.
pub(crate) fn frame_header(src: &[u8], offset: usize) -> Decode<(usize, u8)> {
    let Some(available) = src.get(offset..) else {
        return Decode::NotAFrame;
    };

    let marker_len = available.len().min(START_MARKER.len());
    if available[..marker_len] != START_MARKER[..marker_len] {
        return Decode::NotAFrame;
    }
    if available.len() < HEADER_SIZE {
        return Decode::Incomplete;
    }

    let length = usize::from(available[2]);
    if length < LENGTH_OVERHEAD {
        return Decode::NotAFrame;
    }

    let span = length + FRAME_OVERHEAD;
    if available.len() < span {
        return Decode::Incomplete;
    }
    Decode::Complete {
        value: (length, available[3]),
        span,
    }
}

/// Decode a command frame starting at `offset`.
///
/// Checks the start marker and protocol number and extracts `length − 5`
/// payload bytes after the 4-byte header as text. The CRC is not checked
/// here; the scanner verifies it before handing a span over.
pub fn decode_command(src: &[u8], offset: usize) -> Decode<String> {
    match frame_header(src, offset) {
        Decode::Complete {
            value: (length, PROTOCOL_COMMAND),
            span,
        } => {
            let start = offset + HEADER_SIZE;
            let text = &src[start..start + length - LENGTH_OVERHEAD];
            Decode::Complete {
                value: String::from_utf8_lossy(text).into_owned(),
                span,
            }
        }
        Decode::Complete { .. } => Decode::NotAFrame,
        Decode::Incomplete => {
            // The protocol byte is known once the header is in.
            match src.get(offset + 3) {
                Some(&protocol) if protocol != PROTOCOL_COMMAND => Decode::NotAFrame,
                _ => Decode::Incomplete,
            }
        }
        Decode::NotAFrame => Decode::NotAFrame,
    }
}

/// Decode a frame of any protocol starting at `offset`. The CRC is not
/// checked; see [`verify_checksum`].
pub fn decode_frame(src: &[u8], offset: usize) -> Decode<Frame> {
    match frame_header(src, offset) {
        Decode::Complete {
            value: (length, protocol),
            span,
        } => {
            let start = offset + HEADER_SIZE;
            let seq_at = start + length - LENGTH_OVERHEAD;
            let payload = Bytes::copy_from_slice(&src[start..seq_at]);
            let sequence = u16::from_be_bytes([src[seq_at], src[seq_at + 1]]);
            Decode::Complete {
                value: Frame {
                    protocol,
                    payload,
                    sequence,
                },
                span,
            }
        }
        Decode::Incomplete => Decode::Incomplete,
        Decode::NotAFrame => Decode::NotAFrame,
    }
}

/// Verify the stop marker and CRC of one complete frame (`frame` starts at
/// the start marker and ends after the stop marker).
pub fn verify_checksum(frame: &[u8]) -> Result<()> {
    if frame.len() < FRAME_OVERHEAD + LENGTH_OVERHEAD || frame[..2] != START_MARKER {
        return Err(FrameError::MalformedFrame("not a complete frame"));
    }
    if usize::from(frame[2]) + FRAME_OVERHEAD != frame.len() {
        return Err(FrameError::MalformedFrame("length byte disagrees with span"));
    }

    let crc_at = frame.len() - 4;
    if frame[crc_at + 2..] != STOP_MARKER {
        return Err(FrameError::MalformedFrame("missing stop marker"));
    }

    let expected = u16::from_be_bytes([frame[crc_at], frame[crc_at + 1]]);
    let actual = checksum(&frame[2..crc_at]);
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Configuration for blocking frame I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Read timeout for blocking operations. `None` blocks until data or
    /// close.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations. Default: 10 s.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(10)),
        }
    }
}
