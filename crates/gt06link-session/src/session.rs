use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gt06link_frame::{
    encode_bcd, FrameConfig, FrameError, FrameReader, FrameWriter, TelemetrySample,
};
use gt06link_transport::{TcpTransport, TrackerStream, DEFAULT_CONNECT_TIMEOUT};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type ConnectivityListener = Arc<dyn Fn(bool) + Send + Sync>;
type CommandListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Tracking server address (`host:port`).
    pub server: String,
    /// Per-address TCP connect bound. Name resolution is not bounded.
    pub connect_timeout: Duration,
    /// Bound on every frame write. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", gt06link_transport::DEFAULT_PORT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
        }
    }
}

/// Connection lifecycle. There is no automatic reconnect: after a drop the
/// session stays `Disconnected` until `connect` is called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    LoggedIn,
}

struct State {
    phase: SessionPhase,
    /// Bumped on every successful login; read loops carry the value they
    /// were started with.
    generation: u64,
    writer: Option<FrameWriter<TrackerStream>>,
    shutdown: Option<TrackerStream>,
    reader: Option<JoinHandle<()>>,
    device_id: Option<String>,
    last_notified: Option<bool>,
}

impl State {
    /// Record a connectivity notification; returns whether it must be
    /// delivered.
    fn mark(&mut self, connected: bool) -> bool {
        let deliver = self.last_notified != Some(connected);
        self.last_notified = Some(connected);
        deliver
    }
}

/// Connectivity notices waiting for delivery, in the order the state lock
/// recorded them. One thread at a time drains the queue.
#[derive(Default)]
struct Notices {
    pending: VecDeque<bool>,
    draining: bool,
}

/// Releases the drain role if a listener panics.
struct DrainGuard<'a> {
    notices: &'a Mutex<Notices>,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.notices).draining = false;
        }
    }
}

struct Shared {
    config: SessionConfig,
    state: Mutex<State>,
    notices: Mutex<Notices>,
    on_connectivity: Mutex<Option<ConnectivityListener>>,
    on_command: Mutex<Option<CommandListener>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Queue a connectivity notice. Must be called with the state lock held
    /// so queue order matches state order.
    fn queue_connectivity(&self, connected: bool) {
        lock(&self.notices).pending.push_back(connected);
    }

    /// Deliver queued notices unless another thread is already doing so; that
    /// thread picks up whatever was queued here.
    fn flush_connectivity(&self) {
        {
            let mut notices = lock(&self.notices);
            if notices.draining {
                return;
            }
            notices.draining = true;
        }
        let mut guard = DrainGuard {
            notices: &self.notices,
            armed: true,
        };

        loop {
            let next = {
                let mut notices = lock(&self.notices);
                match notices.pending.pop_front() {
                    Some(connected) => connected,
                    None => {
                        notices.draining = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            let listener = lock(&self.on_connectivity).clone();
            if let Some(listener) = listener {
                listener(next);
            }
        }
    }

    fn notify_command(&self, text: &str) {
        let listener = lock(&self.on_command).clone();
        match listener {
            Some(listener) => listener(text),
            None => debug!(command = text, "no command listener registered"),
        }
    }

    /// Tear the connection down. With `generation` set, only the connection
    /// that generation belongs to is torn down.
    fn teardown(&self, generation: Option<u64>) {
        let reader = {
            let mut state = lock(&self.state);
            if let Some(generation) = generation {
                if state.generation != generation || state.phase != SessionPhase::LoggedIn {
                    debug!(generation, "stale teardown ignored");
                    return;
                }
            }

            let was_connected = state.phase == SessionPhase::LoggedIn;
            state.phase = SessionPhase::Disconnected;
            state.writer = None;
            state.device_id = None;
            if let Some(stream) = state.shutdown.take() {
                if let Err(err) = stream.shutdown() {
                    debug!(error = %err, "socket shutdown failed");
                }
            }
            if was_connected {
                info!(server = %self.config.server, "disconnected");
            }
            if state.mark(false) {
                self.queue_connectivity(false);
            }
            state.reader.take()
        };

        if let Some(handle) = reader {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        self.flush_connectivity();
    }
}

/// A tracker-side session with one GT06 server.
///
/// Connectivity and command listeners are invoked without any internal lock
/// held, so they may call back into the session. The command listener runs
/// on the read-loop thread. Connectivity notices arrive in the order the
/// state changed; a notice raised while another thread is delivering is
/// handed to that thread.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                notices: Mutex::new(Notices::default()),
                state: Mutex::new(State {
                    phase: SessionPhase::Disconnected,
                    generation: 0,
                    writer: None,
                    shutdown: None,
                    reader: None,
                    device_id: None,
                    last_notified: None,
                }),
                on_connectivity: Mutex::new(None),
                on_command: Mutex::new(None),
            }),
        }
    }

    /// Register the connectivity listener, replacing any previous one.
    pub fn on_connectivity(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        *lock(&self.shared.on_connectivity) = Some(Arc::new(listener));
    }

    /// Register the command listener, replacing any previous one.
    pub fn on_command(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.shared.on_command) = Some(Arc::new(listener));
    }

    /// Connect, log in and start the read loop.
    ///
    /// Returns `true` once logged in (immediately if already logged in).
    /// Failures are logged, reported to the connectivity listener as `false`
    /// and never propagated.
    pub fn connect(&self, device_id: &str) -> bool {
        {
            let mut state = lock(&self.shared.state);
            match state.phase {
                SessionPhase::LoggedIn => return true,
                SessionPhase::Connecting => {
                    debug!("connect already in progress");
                    return false;
                }
                SessionPhase::Disconnected => state.phase = SessionPhase::Connecting,
            }
        }

        match self.establish(device_id) {
            Ok((writer, reader, shutdown)) => {
                let mut state = lock(&self.shared.state);
                state.generation = state.generation.wrapping_add(1);
                let generation = state.generation;

                let shared = Arc::clone(&self.shared);
                let spawned = thread::Builder::new()
                    .name("gt06-read-loop".into())
                    .spawn(move || read_loop(shared, reader, generation));
                let handle = match spawned {
                    Ok(handle) => handle,
                    Err(err) => {
                        warn!(error = %err, "failed to start read loop");
                        let _ = shutdown.shutdown();
                        state.phase = SessionPhase::Disconnected;
                        state.last_notified = Some(false);
                        self.shared.queue_connectivity(false);
                        drop(state);
                        self.shared.flush_connectivity();
                        return false;
                    }
                };

                state.phase = SessionPhase::LoggedIn;
                state.writer = Some(writer);
                state.shutdown = Some(shutdown);
                state.reader = Some(handle);
                state.device_id = Some(device_id.to_string());
                if state.mark(true) {
                    self.shared.queue_connectivity(true);
                }
                drop(state);

                info!(server = %self.shared.config.server, device_id, "logged in");
                self.shared.flush_connectivity();
                true
            }
            Err(err) => {
                warn!(server = %self.shared.config.server, error = %err, "connect failed");
                {
                    let mut state = lock(&self.shared.state);
                    state.phase = SessionPhase::Disconnected;
                    state.last_notified = Some(false);
                    self.shared.queue_connectivity(false);
                }
                self.shared.flush_connectivity();
                false
            }
        }
    }

    fn establish(
        &self,
        device_id: &str,
    ) -> Result<(
        FrameWriter<TrackerStream>,
        FrameReader<TrackerStream>,
        TrackerStream,
    )> {
        // Reject bad identifiers before touching the network.
        encode_bcd(device_id)?;

        let config = &self.shared.config;
        let stream = TcpTransport::connect_timeout(&config.server, config.connect_timeout)?;
        stream.set_nodelay(true)?;
        let reader_stream = stream.try_clone()?;
        let shutdown = stream.try_clone()?;

        let frame_config = FrameConfig {
            read_timeout: None,
            write_timeout: config.write_timeout,
        };
        let mut writer = FrameWriter::with_config_tcp(stream, frame_config.clone())?;
        let reader = FrameReader::with_config_tcp(reader_stream, frame_config)?;

        let sequence = writer.send_login(device_id)?;
        debug!(device_id, sequence, "login frame sent");
        Ok((writer, reader, shutdown))
    }

    /// Encode and send one location report. Returns the sequence number
    /// used.
    pub fn send_location(&self, sample: &TelemetrySample) -> Result<u16> {
        let mut state = lock(&self.shared.state);
        if state.phase != SessionPhase::LoggedIn {
            return Err(SessionError::NotLoggedIn);
        }
        let Some(writer) = state.writer.as_mut() else {
            return Err(SessionError::NotLoggedIn);
        };

        match writer.send_location(sample) {
            Ok(sequence) => {
                debug!(
                    sequence,
                    latitude = sample.latitude,
                    longitude = sample.longitude,
                    "location frame sent"
                );
                Ok(sequence)
            }
            Err(err) => {
                let generation = state.generation;
                drop(state);
                warn!(error = %err, "location write failed");
                self.shared.teardown(Some(generation));
                Err(SessionError::WriteFailure(err))
            }
        }
    }

    /// Close the connection. Safe to call at any time, any number of times.
    pub fn disconnect(&self) {
        self.shared.teardown(None);
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == SessionPhase::LoggedIn
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.shared.state).phase
    }

    /// Identifier of the logged-in device, if any.
    pub fn device_id(&self) -> Option<String> {
        lock(&self.shared.state).device_id.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}

fn read_loop(shared: Arc<Shared>, mut reader: FrameReader<TrackerStream>, generation: u64) {
    loop {
        match reader.read_commands() {
            Ok(commands) => {
                for command in commands {
                    info!(command = %command, "command received");
                    shared.notify_command(&command);
                }
            }
            Err(FrameError::ConnectionClosed) => {
                info!("server closed the connection");
                break;
            }
            Err(err) => {
                debug!(error = %err, "read loop stopped");
                break;
            }
        }
    }
    shared.teardown(Some(generation));
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Receiver};

    use gt06link_frame::{FixTime, PROTOCOL_LOCATION, PROTOCOL_LOGIN};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    fn sample() -> TelemetrySample {
        TelemetrySample::now(-23.5505, -46.6333)
            .with_time(FixTime::from_bytes([24, 5, 17, 12, 30, 45]))
            .with_speed(42.9)
    }

    fn listener() -> (TcpTransport, String) {
        let listener = TcpTransport::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().to_string();
        (listener, addr)
    }

    fn session(addr: &str) -> (Session, Receiver<bool>) {
        let session = Session::new(SessionConfig {
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::new(addr)
        });
        let (tx, rx) = mpsc::channel();
        session.on_connectivity(move |connected| {
            let _ = tx.send(connected);
        });
        (session, rx)
    }

    fn drain(rx: &Receiver<bool>) -> Vec<bool> {
        let mut seen = Vec::new();
        while let Ok(value) = rx.recv_timeout(QUIET) {
            seen.push(value);
        }
        seen
    }

    #[test]
    fn login_frame_reaches_server() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("listener should accept");
            let mut reader = FrameReader::new(stream);
            let login = reader.read_frame().expect("login frame should arrive");
            while reader.read_frame().is_ok() {}
            login
        });

        let (session, rx) = session(&addr);
        assert!(session.connect("123456789"));
        assert!(session.is_connected());
        assert_eq!(session.device_id().as_deref(), Some("123456789"));
        assert_eq!(rx.recv_timeout(WAIT), Ok(true));
        session.disconnect();

        let login = server.join().expect("server thread should finish");
        assert_eq!(login.protocol, PROTOCOL_LOGIN);
        assert_eq!(login.sequence, 1);
        assert_eq!(login.device_id().expect("login should carry id"), "123456789000000");
    }

    #[test]
    fn location_sequence_increments() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("listener should accept");
            let mut reader = FrameReader::new(stream);
            (0..3)
                .map(|_| reader.read_frame().expect("frame should arrive"))
                .collect::<Vec<_>>()
        });

        let (session, _rx) = session(&addr);
        assert!(session.connect("861234567890123"));
        assert_eq!(session.send_location(&sample()).expect("send should work"), 2);
        assert_eq!(session.send_location(&sample()).expect("send should work"), 3);

        let frames = server.join().expect("server thread should finish");
        let sequences: Vec<u16> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(frames[1].protocol, PROTOCOL_LOCATION);
        session.disconnect();
    }

    #[test]
    fn command_listener_fires() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("listener should accept");
            let write_half = stream.try_clone().expect("stream should clone");
            let mut reader = FrameReader::new(stream);
            reader.read_frame().expect("login should arrive");
            let mut writer = FrameWriter::new(write_half);
            writer.send_command("engine stop").expect("command should send");
            writer.send_command("restaurar").expect("command should send");
            // Keep the connection open until the client hangs up.
            let _ = reader.read_frame();
        });

        let (session, _rx) = session(&addr);
        let (tx, commands) = mpsc::channel();
        session.on_command(move |text| {
            let _ = tx.send(text.to_string());
        });

        assert!(session.connect("123456789012345"));
        assert_eq!(commands.recv_timeout(WAIT).as_deref(), Ok("engine stop"));
        assert_eq!(commands.recv_timeout(WAIT).as_deref(), Ok("restaurar"));

        session.disconnect();
        server.join().expect("server thread should finish");
    }

    #[test]
    fn peer_close_notifies_once() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("listener should accept");
            let mut reader = FrameReader::new(stream);
            reader.read_frame().expect("login should arrive");
        });

        let (session, rx) = session(&addr);
        assert!(session.connect("123456789"));
        server.join().expect("server thread should finish");

        assert_eq!(rx.recv_timeout(WAIT), Ok(true));
        assert_eq!(rx.recv_timeout(WAIT), Ok(false));
        assert!(drain(&rx).is_empty());
        assert_eq!(session.phase(), SessionPhase::Disconnected);

        session.disconnect();
        assert!(drain(&rx).is_empty());
        assert!(matches!(
            session.send_location(&sample()),
            Err(SessionError::NotLoggedIn)
        ));
    }

    #[test]
    fn immediate_hangup_ends_on_false() {
        const SETTLE: Duration = Duration::from_millis(50);

        for round in 0..100 {
            let (listener, addr) = listener();
            let server = thread::spawn(move || {
                drop(listener.accept().expect("listener should accept"));
            });

            let (session, rx) = session(&addr);
            session.connect("123456789");
            server.join().expect("server thread should finish");

            while session.is_connected() {
                thread::sleep(SETTLE);
            }
            // Wait for a `false`, then make sure nothing follows it.
            let mut seen = Vec::new();
            loop {
                let patience = if seen.last() == Some(&false) { SETTLE } else { WAIT };
                match rx.recv_timeout(patience) {
                    Ok(value) => seen.push(value),
                    Err(_) => break,
                }
            }
            assert_eq!(seen.last(), Some(&false), "round {round}: {seen:?}");
            assert!(seen == [false] || seen == [true, false], "round {round}: {seen:?}");
        }
    }

    #[test]
    fn write_failure_tears_down_once() {
        let (listener, addr) = listener();
        let (done_tx, done) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            // Accept and never read, so the client's send buffer fills.
            let stream = listener.accept().expect("listener should accept");
            let _ = done.recv();
            drop(stream);
        });

        let session = Session::new(SessionConfig {
            connect_timeout: Duration::from_secs(2),
            write_timeout: Some(Duration::from_millis(100)),
            ..SessionConfig::new(&addr)
        });
        let (tx, rx) = mpsc::channel();
        session.on_connectivity(move |connected| {
            let _ = tx.send(connected);
        });
        assert!(session.connect("123456789"));
        assert_eq!(rx.recv_timeout(WAIT), Ok(true));

        let err = loop {
            match session.send_location(&sample()) {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, SessionError::WriteFailure(_)), "{err:?}");
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(matches!(
            session.send_location(&sample()),
            Err(SessionError::NotLoggedIn)
        ));

        let _ = done_tx.send(());
        server.join().expect("server thread should finish");
        assert_eq!(drain(&rx), vec![false]);
        session.disconnect();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn unreachable_endpoint_notifies_false_once() {
        let (listener, addr) = listener();
        drop(listener);

        let (session, rx) = session(&addr);
        assert!(!session.connect("123456789"));
        assert_eq!(drain(&rx), vec![false]);
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(matches!(
            session.send_location(&sample()),
            Err(SessionError::NotLoggedIn)
        ));
    }

    #[test]
    fn invalid_identifier_fails_connect() {
        let (_listener, addr) = listener();
        let (session, rx) = session(&addr);
        assert!(!session.connect("86-1234"));
        assert_eq!(drain(&rx), vec![false]);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("listener should accept");
            let mut reader = FrameReader::new(stream);
            while reader.read_frame().is_ok() {}
        });

        let (session, rx) = session(&addr);
        assert!(session.connect("123456789"));
        session.disconnect();
        session.disconnect();
        server.join().expect("server thread should finish");

        assert_eq!(drain(&rx), vec![true, false]);
        assert!(!session.is_connected());
    }

    #[test]
    fn disconnect_on_fresh_session_notifies_once() {
        let (session, rx) = session("127.0.0.1:9");
        session.disconnect();
        session.disconnect();
        assert_eq!(drain(&rx), vec![false]);
    }

    #[test]
    fn connect_while_logged_in_is_noop() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let stream = listener.accept().expect("listener should accept");
            let mut reader = FrameReader::new(stream);
            let mut frames = 0;
            while reader.read_frame().is_ok() {
                frames += 1;
            }
            frames
        });

        let (session, rx) = session(&addr);
        assert!(session.connect("123456789"));
        assert!(session.connect("123456789"));
        session.disconnect();

        assert_eq!(server.join().expect("server thread should finish"), 1);
        assert_eq!(drain(&rx), vec![true, false]);
    }

    #[test]
    fn reconnect_restarts_sequence() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let mut logins = Vec::new();
            for _ in 0..2 {
                let stream = listener.accept().expect("listener should accept");
                let mut reader = FrameReader::new(stream);
                let mut sequences = Vec::new();
                while let Ok(frame) = reader.read_frame() {
                    sequences.push(frame.sequence);
                }
                logins.push(sequences);
            }
            logins
        });

        let (session, _rx) = session(&addr);
        assert!(session.connect("123456789"));
        session.send_location(&sample()).expect("send should work");
        session.disconnect();

        assert!(session.connect("123456789"));
        assert_eq!(session.send_location(&sample()).expect("send should work"), 2);
        session.disconnect();

        let logins = server.join().expect("server thread should finish");
        assert_eq!(logins, vec![vec![1, 2], vec![1, 2]]);
    }
}
