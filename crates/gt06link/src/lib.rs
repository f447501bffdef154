//! GT06 vehicle-tracker protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connect/accept with bounded timeouts
//! - [`frame`]: GT06 framing, CRC16, BCD identifiers and the stream scanner
//! - [`session`]: tracker-side session and command dispatch (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use gt06link_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gt06link_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use gt06link_session::*;
}
