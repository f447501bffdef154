//! Tracker-side GT06 session management.
//!
//! A [`Session`] logs a device in to a tracking server, reports locations
//! and hands remote command text to a listener. The [`CommandDispatcher`]
//! turns that text into relay actions on an [`Actuator`].

pub mod command;
pub mod error;
pub mod session;

pub use command::{Actuator, CommandDispatcher, CutIntent, DispatcherConfig, LineActuator};
pub use error::{Result, SessionError};
pub use session::{Session, SessionConfig, SessionPhase};
