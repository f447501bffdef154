use std::fmt;
use std::io;

use gt06link_frame::FrameError;
use gt06link_session::SessionError;
use gt06link_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::InvalidIdentifier(_)
        | FrameError::InvalidBcd { .. }
        | FrameError::ChecksumMismatch { .. }
        | FrameError::MalformedFrame(_)
        | FrameError::UnexpectedProtocol { .. }
        | FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) | SessionError::WriteFailure(err) => frame_error(context, err),
        SessionError::NotLoggedIn => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SessionError::Actuator(source) => io_error(context, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = io_error("write", io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(err.code, TIMEOUT);
        let err = transport_error(
            "connect",
            TransportError::Connect {
                addr: "10.0.0.1:5023".into(),
                source: io::Error::from(io::ErrorKind::TimedOut),
            },
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn bad_input_is_data_invalid() {
        let err = frame_error("encode", FrameError::InvalidIdentifier("12ab".into()));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("encode: "));
    }

    #[test]
    fn session_errors_unwrap_layers() {
        let err = session_error(
            "send",
            SessionError::WriteFailure(FrameError::ConnectionClosed),
        );
        assert_eq!(err.code, FAILURE);
        let err = session_error("send", SessionError::NotLoggedIn);
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
