//! Remote command dispatch.
//!
//! Servers send free-form command text. Only two intents are recognised:
//! cutting the engine relay and restoring it.

use std::io::{self, Write};

use tracing::{info, warn};

use crate::error::{Result, SessionError};

/// What a recognised command asks the vehicle to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutIntent {
    ActivateCut,
    DeactivateCut,
}

/// Something that can drive the engine-cut relay.
pub trait Actuator {
    fn activate_cut(&mut self) -> io::Result<()>;
    fn deactivate_cut(&mut self) -> io::Result<()>;
}

/// Accepted command spellings. Matching is case-insensitive and ignores
/// surrounding whitespace.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub activate: Vec<String>,
    pub deactivate: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            activate: vec!["engine stop".into(), "corte".into()],
            deactivate: vec!["engine resume".into(), "restaurar".into()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Map command text to an intent. Unknown text yields `None`.
    pub fn intent(&self, text: &str) -> Option<CutIntent> {
        let text = text.trim();
        let matches = |words: &[String]| words.iter().any(|w| w.trim().eq_ignore_ascii_case(text));

        if matches(self.config.activate.as_slice()) {
            Some(CutIntent::ActivateCut)
        } else if matches(self.config.deactivate.as_slice()) {
            Some(CutIntent::DeactivateCut)
        } else {
            warn!(command = text, "unrecognised command");
            None
        }
    }

    /// Deliver the intent behind `text` to `actuator`.
    ///
    /// Returns the intent acted on, or `None` for unknown text.
    pub fn dispatch<A: Actuator + ?Sized>(
        &self,
        text: &str,
        actuator: &mut A,
    ) -> Result<Option<CutIntent>> {
        let Some(intent) = self.intent(text) else {
            return Ok(None);
        };

        let outcome = match intent {
            CutIntent::ActivateCut => actuator.activate_cut(),
            CutIntent::DeactivateCut => actuator.deactivate_cut(),
        };
        outcome.map_err(SessionError::Actuator)?;
        info!(?intent, "relay actuated");
        Ok(Some(intent))
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

const CUT: &[u8] = b"1";
const RESTORE: &[u8] = b"0";

/// Relay controller speaking the one-byte line protocol: `1` cuts the
/// engine, `0` restores it.
///
/// Any writer works, e.g. a serial device node opened as a file.
#[derive(Debug)]
pub struct LineActuator<W> {
    inner: W,
}

impl<W: Write> LineActuator<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    fn send(&mut self, byte: &[u8]) -> io::Result<()> {
        self.inner.write_all(byte)?;
        self.inner.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Actuator for LineActuator<W> {
    fn activate_cut(&mut self) -> io::Result<()> {
        self.send(CUT)
    }

    fn deactivate_cut(&mut self) -> io::Result<()> {
        self.send(RESTORE)
    }
}
