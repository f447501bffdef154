/// Errors that can occur during GT06 frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The device identifier contains characters other than ASCII digits.
    #[error("invalid device identifier {0:?} (digits only, at most 15)")]
    InvalidIdentifier(String),

    /// A BCD byte holds a nibble greater than 9.
    #[error("invalid BCD byte 0x{byte:02X} at offset {offset}")]
    InvalidBcd { byte: u8, offset: usize },

    /// The CRC field does not match the checksum of the frame body.
    #[error("checksum mismatch (frame carries 0x{expected:04X}, computed 0x{actual:04X})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// The bytes do not form a structurally valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// A frame of a different protocol number was expected.
    #[error("unexpected protocol 0x{actual:02X} (expected 0x{expected:02X})")]
    UnexpectedProtocol { expected: u8, actual: u8 },

    /// The payload does not fit the one-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
