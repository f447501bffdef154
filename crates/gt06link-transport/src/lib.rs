//! TCP transport for GT06 tracker sessions.
//!
//! This is the lowest layer of gt06link. It resolves the tracking endpoint,
//! connects with a bounded timeout and hands out a [`TrackerStream`] that
//! the framing and session layers read from and write to.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::TrackerStream;
pub use tcp::{with_default_port, TcpTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};
