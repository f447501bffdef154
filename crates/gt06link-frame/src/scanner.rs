//! Frame recovery from an accumulating inbound byte buffer.
//!
//! TCP delivers bytes, not frames: one read may hold half a frame or three
//! of them. The scanner walks the buffer byte by byte looking for the start
//! marker, verifies each candidate (stop marker + CRC) and consumes what it
//! recognises. Whatever could still become a frame stays in the buffer, so
//! the next call picks up where this one stopped once more bytes arrive.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{
    decode_command, decode_frame, frame_header, verify_checksum, Decode, Frame, START_MARKER,
};

enum Located {
    /// A verified frame occupies `start..start + span`.
    Frame { start: usize, span: usize },
    /// Nothing more to emit; bytes before `keep_from` can be dropped.
    Exhausted { keep_from: usize },
}

fn locate(src: &[u8]) -> Located {
    // First candidate whose declared span has not fully arrived yet.
    let mut pending = None;
    let mut i = 0;

    while i < src.len() {
        if src[i] != START_MARKER[0] {
            i += 1;
            continue;
        }

        match frame_header(src, i) {
            Decode::NotAFrame => i += 1,
            Decode::Incomplete => {
                // Keep looking: a complete frame further on proves this
                // candidate was noise.
                pending.get_or_insert(i);
                i += 1;
            }
            Decode::Complete { span, .. } => match verify_checksum(&src[i..i + span]) {
                Ok(()) => return Located::Frame { start: i, span },
                Err(err) => {
                    warn!(offset = i, span, error = %err, "dropping corrupt frame");
                    i += START_MARKER.len();
                }
            },
        }
    }

    Located::Exhausted {
        keep_from: pending.unwrap_or(src.len()),
    }
}

/// Extract every complete command frame from `src`.
///
/// Consumed bytes, corrupt frames and bytes that can never start a frame
/// are removed from `src`; an incomplete trailing frame is left in place
/// for the next call. Non-command frames (such as server acknowledgements)
/// are consumed and skipped.
pub fn scan(src: &mut BytesMut) -> Vec<String> {
    let mut commands = Vec::new();

    loop {
        match locate(src) {
            Located::Frame { start, span } => {
                match decode_command(src, start) {
                    Decode::Complete { value, .. } => {
                        debug!(command = %value, "command frame received");
                        commands.push(value);
                    }
                    _ => debug!(protocol = src[start + 3], "skipping non-command frame"),
                }
                src.advance(start + span);
            }
            Located::Exhausted { keep_from } => {
                src.advance(keep_from);
                return commands;
            }
        }
    }
}

/// Extract the next complete frame of any protocol from `src`.
///
/// Same retention rules as [`scan`]. Returns `None` when no complete,
/// verified frame is buffered yet.
pub fn next_frame(src: &mut BytesMut) -> Option<Frame> {
    loop {
        match locate(src) {
            Located::Frame { start, span } => {
                let decoded = decode_frame(src, start);
                src.advance(start + span);
                if let Decode::Complete { value, .. } = decoded {
                    return Some(value);
                }
            }
            Located::Exhausted { keep_from } => {
                src.advance(keep_from);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_command, encode_location, encode_login, PROTOCOL_LOGIN};
    use crate::telemetry::{FixTime, TelemetrySample};

    fn command(text: &str, sequence: u16) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_command(text, sequence, &mut buf).unwrap();
        buf.to_vec()
    }

    /// Server acknowledgement of a login: empty payload.
    fn login_ack(sequence: u16) -> Vec<u8> {
        let body = [0x05, PROTOCOL_LOGIN, (sequence >> 8) as u8, sequence as u8];
        let crc = crate::crc::checksum(&body);
        let mut frame = vec![0x78, 0x78];
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&[0x0D, 0x0A]);
        frame
    }

    #[test]
    fn whole_frame_yields_command() {
        let mut buf = BytesMut::from(command("engine stop", 1).as_slice());
        assert_eq!(scan(&mut buf), vec!["engine stop".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn coalesced_frames_in_order() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"\x00\x01garbage");
        buf.extend_from_slice(&command("engine stop", 1));
        buf.extend_from_slice(&command("engine resume", 2));

        assert_eq!(scan(&mut buf), vec!["engine stop", "engine resume"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn split_at_every_offset() {
        let frame = command("engine stop", 1);
        let whole = scan(&mut BytesMut::from(frame.as_slice()));

        for cut in 0..=frame.len() {
            let mut buf = BytesMut::from(&frame[..cut]);
            let mut seen = scan(&mut buf);
            buf.extend_from_slice(&frame[cut..]);
            seen.extend(scan(&mut buf));

            assert_eq!(seen, whole, "split at {cut}");
            assert!(buf.is_empty(), "split at {cut} left {buf:?}");
        }
    }

    #[test]
    fn byte_by_byte_delivery() {
        let mut stream = command("corte", 1);
        stream.extend_from_slice(&command("restaurar", 2));

        let mut buf = BytesMut::new();
        let mut seen = Vec::new();
        for byte in stream {
            buf.extend_from_slice(&[byte]);
            seen.extend(scan(&mut buf));
        }
        assert_eq!(seen, vec!["corte", "restaurar"]);
    }

    #[test]
    fn single_bit_flip_drops_only_that_frame() {
        let corrupt_source = command("engine stop", 1);
        let follower = command("engine resume", 2);

        for index in 0..corrupt_source.len() {
            for bit in 0..8 {
                let mut corrupt = corrupt_source.clone();
                corrupt[index] ^= 1 << bit;

                let mut buf = BytesMut::from(corrupt.as_slice());
                buf.extend_from_slice(&follower);

                assert_eq!(
                    scan(&mut buf),
                    vec!["engine resume"],
                    "flip byte {index} bit {bit}"
                );
                assert!(buf.is_empty(), "flip byte {index} bit {bit}");
            }
        }
    }

    #[test]
    fn corrupt_frame_alone_emits_nothing() {
        let mut corrupt = command("engine stop", 1);
        corrupt[8] ^= 0x20;
        let mut buf = BytesMut::from(corrupt.as_slice());
        assert!(scan(&mut buf).is_empty());
    }

    #[test]
    fn non_command_frames_are_skipped() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&login_ack(1));
        buf.extend_from_slice(&command("engine stop", 2));

        assert_eq!(scan(&mut buf), vec!["engine stop"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_marker_half_retained() {
        let mut buf = BytesMut::from(&b"noise\x78"[..]);
        assert!(scan(&mut buf).is_empty());
        assert_eq!(buf.as_ref(), &[0x78]);

        let frame = command("engine stop", 1);
        buf.extend_from_slice(&frame[1..]);
        assert_eq!(scan(&mut buf), vec!["engine stop"]);
    }

    #[test]
    fn bytes_without_marker_dropped() {
        let mut buf = BytesMut::from(&b"\x01\x02\x03\x78\x00\x78"[..]);
        assert!(scan(&mut buf).is_empty());
        assert_eq!(buf.as_ref(), &[0x78]);
    }

    #[test]
    fn incomplete_header_retained_from_marker() {
        let frame = command("engine stop", 1);
        let mut buf = BytesMut::from(&b"ab"[..]);
        buf.extend_from_slice(&frame[..3]);

        assert!(scan(&mut buf).is_empty());
        assert_eq!(buf.as_ref(), &frame[..3]);
    }

    #[test]
    fn bogus_header_does_not_block_later_frame() {
        // A marker announcing 0xF0 bytes that never arrive.
        let mut buf = BytesMut::from(&[0x78, 0x78, 0xF0, 0x80, 0x01][..]);
        buf.extend_from_slice(&command("engine stop", 1));

        assert_eq!(scan(&mut buf), vec!["engine stop"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn next_frame_yields_any_protocol() {
        let sample = TelemetrySample {
            time: FixTime::from_bytes([24, 1, 2, 3, 4, 5]),
            latitude: 10.0,
            longitude: 20.0,
            speed: 30.0,
            accuracy: 0.0,
            altitude: 0.0,
        };

        let mut buf = BytesMut::new();
        encode_login("123456789012345", 1, &mut buf).unwrap();
        encode_location(&sample, 2, &mut buf);
        let full = buf.len();
        buf.truncate(full - 3);

        let login = next_frame(&mut buf).unwrap();
        assert_eq!(login.protocol, PROTOCOL_LOGIN);
        assert_eq!(login.device_id().unwrap(), "123456789012345");

        assert!(next_frame(&mut buf).is_none());
        assert!(!buf.is_empty());
    }
}
