/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] gt06link_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] gt06link_frame::FrameError),

    /// Operation requires a logged-in session.
    #[error("session is not logged in")]
    NotLoggedIn,

    /// Writing to the server failed; the session has been torn down.
    #[error("write failed: {0}")]
    WriteFailure(#[source] gt06link_frame::FrameError),

    /// The actuation collaborator failed.
    #[error("actuator failed: {0}")]
    Actuator(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
