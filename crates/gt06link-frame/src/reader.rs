use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use gt06link_transport::TrackerStream;

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::scanner::{next_frame, scan};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads GT06 frames from any `Read` stream.
///
/// Owns the inbound buffer: bytes that do not yet form a complete frame are
/// kept across reads, so frames split by TCP decode once the rest arrives.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Perform one blocking read and return the commands it completed.
    ///
    /// The result may be empty when the read only delivered part of a frame.
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream.
    pub fn read_commands(&mut self) -> Result<Vec<String>> {
        self.fill()?;
        Ok(scan(&mut self.buf))
    }

    /// Read the next complete, CRC-verified frame of any protocol (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = next_frame(&mut self.buf) {
                return Ok(frame);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<TrackerStream> {
    /// Create a frame reader for `TrackerStream` and apply read timeout from
    /// config.
    pub fn with_config_tcp(inner: TrackerStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: gt06link_transport::TransportError) -> FrameError {
    match err {
        gt06link_transport::TransportError::Io(io)
        | gt06link_transport::TransportError::Accept(io) => FrameError::Io(io),
        gt06link_transport::TransportError::Bind { source, .. }
        | gt06link_transport::TransportError::Connect { source, .. }
        | gt06link_transport::TransportError::Resolve { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use gt06link_transport::TcpTransport;

    use super::*;
    use crate::codec::{encode_command, encode_login, PROTOCOL_COMMAND, PROTOCOL_LOGIN};

    fn wire(commands: &[&str]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (seq, text) in commands.iter().enumerate() {
            encode_command(text, seq as u16 + 1, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_commands_from_one_chunk() {
        let mut reader = FrameReader::new(Cursor::new(wire(&["engine stop", "engine resume"])));
        let commands = reader.read_commands().unwrap();
        assert_eq!(commands, vec!["engine stop", "engine resume"]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn read_frame_any_protocol() {
        let mut bytes = BytesMut::new();
        encode_login("123456789", 1, &mut bytes).unwrap();
        encode_command("engine stop", 2, &mut bytes).unwrap();

        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        let login = reader.read_frame().unwrap();
        let command = reader.read_frame().unwrap();

        assert_eq!((login.protocol, login.sequence), (PROTOCOL_LOGIN, 1));
        assert_eq!((command.protocol, command.sequence), (PROTOCOL_COMMAND, 2));
        assert_eq!(command.command_text().unwrap(), "engine stop");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_commands().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let bytes = wire(&["engine stop"]);
        let mut reader = FrameReader::new(Cursor::new(bytes[..9].to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered(), 9);
    }

    #[test]
    fn corrupt_frame_in_stream_skipped() {
        let mut bytes = wire(&["engine stop"]);
        bytes[6] ^= 0xFF;
        bytes.extend_from_slice(&wire(&["restaurar"]));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.command_text().unwrap(), "restaurar");
    }

    /// Replays a fixed script of read outcomes, then reports EOF.
    struct Scripted(std::collections::VecDeque<std::io::Result<Vec<u8>>>);

    impl Scripted {
        fn chunks(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
            Self(chunks.into_iter().map(Ok).collect())
        }

        fn fail_then(kind: ErrorKind, bytes: Vec<u8>) -> Self {
            Self([Err(std::io::Error::from(kind)), Ok(bytes)].into())
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(err)) => Err(err),
                Some(Ok(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.0.push_front(Ok(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn one_byte_per_read() {
        let bytes = wire(&["engine stop"]);
        let mut reader = FrameReader::new(Scripted::chunks(bytes.into_iter().map(|b| vec![b])));

        let mut reads = 0;
        let mut seen = Vec::new();
        while seen.is_empty() {
            seen = reader.read_commands().unwrap();
            reads += 1;
        }
        assert_eq!(seen, vec!["engine stop"]);
        assert_eq!(reads, 21);
    }

    #[test]
    fn would_block_surfaces_as_io_error() {
        let mut reader = FrameReader::new(Scripted::fail_then(
            ErrorKind::WouldBlock,
            wire(&["engine stop"]),
        ));
        let err = reader.read_commands().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));

        // The stream stays usable after a timeout.
        assert_eq!(reader.read_commands().unwrap(), vec!["engine stop"]);
    }

    #[test]
    fn interrupted_read_retries() {
        let mut reader = FrameReader::new(Scripted::fail_then(
            ErrorKind::Interrupted,
            wire(&["engine resume"]),
        ));
        assert_eq!(reader.read_commands().unwrap(), vec!["engine resume"]);
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut reader = FrameReader::with_config_tcp(stream, FrameConfig::default()).unwrap();
            reader.read_frame().unwrap()
        });

        let stream = TcpTransport::connect(&addr).unwrap();
        let mut writer = crate::writer::FrameWriter::new(stream);
        writer.send_login("861234567890123").unwrap();

        let frame = server.join().unwrap();
        assert_eq!(frame.device_id().unwrap(), "861234567890123");
    }
}
