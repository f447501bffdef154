//! `tokio_util::codec` adapter for GT06 frames.
//!
//! Decoding shares the blocking scanner, so corrupt frames and noise are
//! skipped the same way. Encoding takes an [`Outbound`] that carries its own
//! sequence number; sequencing stays with the caller.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_command, encode_location, encode_login, Frame};
use crate::error::FrameError;
use crate::scanner::next_frame;
use crate::telemetry::TelemetrySample;

/// A frame to be encoded by [`Gt06Codec`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Login { device_id: String, sequence: u16 },
    Location { sample: TelemetrySample, sequence: u16 },
    Command { text: String, sequence: u16 },
}

/// Tokio codec for GT06 framing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gt06Codec;

impl Gt06Codec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for Gt06Codec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_frame(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = next_frame(src) {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(leftover = src.len(), "discarding partial frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Outbound> for Gt06Codec {
    type Error = FrameError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Outbound::Login {
                device_id,
                sequence,
            } => encode_login(&device_id, sequence, dst),
            Outbound::Location { sample, sequence } => {
                encode_location(&sample, sequence, dst);
                Ok(())
            }
            Outbound::Command { text, sequence } => encode_command(&text, sequence, dst),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::{PROTOCOL_COMMAND, PROTOCOL_LOCATION, PROTOCOL_LOGIN};
    use crate::telemetry::FixTime;

    fn sample() -> TelemetrySample {
        TelemetrySample::now(-23.5505, -46.6333)
            .with_time(FixTime::from_bytes([24, 5, 17, 12, 30, 45]))
            .with_speed(42.9)
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut wire = BytesMut::new();
        Gt06Codec
            .encode(
                Outbound::Command {
                    text: "engine stop".into(),
                    sequence: 1,
                },
                &mut wire,
            )
            .unwrap();

        let mut codec = Gt06Codec::new();
        let mut buf = BytesMut::from(&wire[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[10..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.protocol, PROTOCOL_COMMAND);
        assert_eq!(frame.command_text().unwrap(), "engine stop");
    }

    #[test]
    fn encode_rejects_bad_identifier() {
        let mut dst = BytesMut::new();
        let err = Gt06Codec
            .encode(
                Outbound::Login {
                    device_id: "12-34".into(),
                    sequence: 1,
                },
                &mut dst,
            )
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn framed_roundtrip() {
        let mut sink = FramedWrite::new(Vec::new(), Gt06Codec);
        sink.send(Outbound::Login {
            device_id: "123456789".into(),
            sequence: 1,
        })
        .await
        .unwrap();
        sink.send(Outbound::Location {
            sample: sample(),
            sequence: 2,
        })
        .await
        .unwrap();
        let mut wire = sink.into_inner();
        // Trailing noise must not surface as an error at EOF.
        wire.extend_from_slice(&[0x78, 0x78, 0x10]);

        let frames: Vec<Frame> = FramedRead::new(wire.as_slice(), Gt06Codec)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].protocol, PROTOCOL_LOGIN);
        assert_eq!(frames[0].device_id().unwrap(), "123456789");
        assert_eq!(frames[1].protocol, PROTOCOL_LOCATION);
        assert_eq!(frames[1].sequence, 2);
        assert_eq!(frames[1].location().unwrap().speed, 42);
    }
}
