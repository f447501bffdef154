//! GT06 wire framing for vehicle trackers.
//!
//! Every message on the wire is framed as:
//! - A 2-byte start marker (`0x78 0x78`)
//! - A 1-byte length covering protocol number through CRC
//! - A 1-byte protocol number (login, location, command)
//! - The protocol payload, a 2-byte big-endian sequence number
//! - A 2-byte CRC16 over length..sequence and a `0x0D 0x0A` stop marker
//!
//! The [`scanner`] recovers frames from a boundary-less TCP byte stream, so
//! callers never deal with split or coalesced reads.

pub mod bcd;
pub mod codec;
pub mod crc;
pub mod error;
pub mod reader;
pub mod scanner;
pub mod telemetry;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use bcd::{decode_bcd, encode_bcd, pad_identifier, BCD_LEN, IDENTIFIER_DIGITS};
pub use codec::{
    decode_command, decode_frame, encode_command, encode_location, encode_login, verify_checksum,
    Decode, Frame, FrameConfig, HEADER_SIZE, LOCATION_FRAME_LEN, LOGIN_FRAME_LEN, MAX_PAYLOAD,
    PROTOCOL_COMMAND, PROTOCOL_LOCATION, PROTOCOL_LOGIN, START_MARKER, STOP_MARKER,
};
pub use crc::checksum;
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use scanner::{next_frame, scan};
pub use telemetry::{FixTime, LocationReport, TelemetrySample, COORDINATE_SCALE};
pub use writer::{FrameWriter, FIRST_SEQUENCE};

#[cfg(feature = "async")]
pub use async_codec::{Gt06Codec, Outbound};
