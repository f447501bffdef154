use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gt06link_frame::{FrameConfig, FrameError, FrameReader, FrameWriter, PROTOCOL_LOGIN};
use gt06link_transport::TcpTransport;
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

/// How often a blocked read wakes up to check for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        TcpTransport::bind(&args.bind).map_err(|err| transport_error("bind failed", err))?;
    info!(addr = %listener.local_addr(), "waiting for a tracker");

    let running = Arc::new(AtomicBool::new(true));
    super::track::install_ctrlc_handler(running.clone())?;

    let stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!(peer = %peer, "tracker connected");

    let write_half = stream
        .try_clone()
        .map_err(|err| transport_error("stream clone failed", err))?;
    let config = FrameConfig {
        read_timeout: Some(POLL_INTERVAL),
        ..FrameConfig::default()
    };
    let mut reader = FrameReader::with_config_tcp(stream, config.clone())
        .map_err(|err| frame_error("stream setup failed", err))?;
    let mut writer = FrameWriter::with_config_tcp(write_half, config)
        .map_err(|err| frame_error("stream setup failed", err))?;

    let mut pending_command = args.command;
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(FrameError::ConnectionClosed) => {
                info!(peer = %peer, "tracker disconnected");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        print_frame(&frame, Some(&peer), format);
        printed = printed.saturating_add(1);

        if frame.protocol == PROTOCOL_LOGIN {
            if let Some(text) = pending_command.take() {
                let sequence = writer
                    .send_command(&text)
                    .map_err(|err| frame_error("command send failed", err))?;
                info!(command = %text, sequence, "command sent");
            }
        }

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    Ok(SUCCESS)
}
