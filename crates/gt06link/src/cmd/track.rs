use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use gt06link_session::{Actuator, CommandDispatcher, LineActuator, Session, SessionConfig};
use gt06link_transport::with_default_port;
use tracing::{info, warn};

use crate::cmd::encode::sample;
use crate::cmd::{parse_duration, TrackArgs};
use crate::exit::{
    io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR,
};
use crate::output::{print_report, OutputFormat};

const TICK: Duration = Duration::from_millis(100);

type SharedActuator = Arc<Mutex<Box<dyn Actuator + Send>>>;

pub fn run(args: TrackArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let config = SessionConfig {
        connect_timeout: parse_duration(&args.connect_timeout)?,
        ..SessionConfig::new(with_default_port(&args.server))
    };

    let relay = match &args.relay {
        Some(path) => {
            let device = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            let actuator: Box<dyn Actuator + Send> = Box::new(LineActuator::new(device));
            Some(Arc::new(Mutex::new(actuator)))
        }
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let session = Session::new(config);
    session.on_connectivity(|connected| info!(connected, "connectivity changed"));
    let dispatcher = CommandDispatcher::default();
    session.on_command(move |text| handle_command(&dispatcher, relay.as_ref(), text));

    if !session.connect(&args.device_id) {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("could not log in to {}", session.config().server),
        ));
    }

    let mut reported = 0usize;
    let mut lost = false;
    while running.load(Ordering::SeqCst) {
        let sample = sample(&args.position);
        let sequence = session
            .send_location(&sample)
            .map_err(|err| session_error("location report failed", err))?;
        print_report(sequence, &sample, format);
        reported = reported.saturating_add(1);

        if args.count.is_some_and(|count| reported >= count) {
            break;
        }
        if !wait(interval, &running, &session) {
            lost = !session.is_connected();
            break;
        }
    }

    session.disconnect();
    if lost {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            "connection to the server was lost",
        ));
    }
    Ok(SUCCESS)
}

/// Sleep for `interval`, waking early on Ctrl-C or connection loss.
/// Returns whether reporting should continue.
fn wait(interval: Duration, running: &AtomicBool, session: &Session) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if !running.load(Ordering::SeqCst) || !session.is_connected() {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(TICK.min(left));
    }
}

fn handle_command(dispatcher: &CommandDispatcher, relay: Option<&SharedActuator>, text: &str) {
    let Some(relay) = relay else {
        if let Some(intent) = dispatcher.intent(text) {
            info!(?intent, "no relay configured; command not actuated");
        }
        return;
    };

    let mut actuator = relay.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(err) = dispatcher.dispatch(text, actuator.as_mut()) {
        warn!(error = %err, command = text, "relay actuation failed");
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
