use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use gt06link_transport::TrackerStream;

use crate::codec::{
    encode_command, encode_location, encode_login, FrameConfig, LOCATION_FRAME_LEN,
};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;
use crate::telemetry::TelemetrySample;

/// Sequence number of the first frame on a fresh connection.
pub const FIRST_SEQUENCE: u16 = 1;

/// Writes complete GT06 frames to any `Write` stream.
///
/// Owns the per-connection sequence counter: every frame written takes the
/// next number, wrapping after `u16::MAX`.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    next_sequence: u16,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(LOCATION_FRAME_LEN),
            next_sequence: FIRST_SEQUENCE,
            config,
        }
    }

    /// Encode and send a login frame. Returns the sequence number used.
    pub fn send_login(&mut self, device_id: &str) -> Result<u16> {
        let sequence = self.next_sequence;
        self.buf.clear();
        encode_login(device_id, sequence, &mut self.buf)?;
        self.commit(sequence)
    }

    /// Encode and send a location frame. Returns the sequence number used.
    pub fn send_location(&mut self, sample: &TelemetrySample) -> Result<u16> {
        let sequence = self.next_sequence;
        self.buf.clear();
        encode_location(sample, sequence, &mut self.buf);
        self.commit(sequence)
    }

    /// Encode and send a command frame (server side). Returns the sequence
    /// number used.
    pub fn send_command(&mut self, text: &str) -> Result<u16> {
        let sequence = self.next_sequence;
        self.buf.clear();
        encode_command(text, sequence, &mut self.buf)?;
        self.commit(sequence)
    }

    fn commit(&mut self, sequence: u16) -> Result<u16> {
        self.next_sequence = sequence.wrapping_add(1);
        let frame = std::mem::take(&mut self.buf);
        let result = self.write_all(&frame).and_then(|()| self.flush());
        self.buf = frame;
        result.map(|()| sequence)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // A write timeout surfaces as WouldBlock/TimedOut; retrying
                // would make the timeout unbounded.
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Sequence number the next frame will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    /// Override the sequence number of the next frame.
    pub fn set_next_sequence(&mut self, sequence: u16) {
        self.next_sequence = sequence;
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<TrackerStream> {
    /// Create a frame writer for `TrackerStream` and apply write timeout
    /// from config.
    pub fn with_config_tcp(inner: TrackerStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
