use bytes::BytesMut;
use gt06link_frame::{
    encode_command, encode_location, encode_login, TelemetrySample, PROTOCOL_COMMAND,
    PROTOCOL_LOCATION, PROTOCOL_LOGIN,
};

use crate::cmd::{EncodeCommand, PositionArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(command: EncodeCommand, format: OutputFormat) -> CliResult<i32> {
    let mut buf = BytesMut::new();
    let (protocol, sequence) = match command {
        EncodeCommand::Login {
            device_id,
            sequence,
        } => {
            encode_login(&device_id, sequence, &mut buf)
                .map_err(|err| frame_error("encode login failed", err))?;
            (PROTOCOL_LOGIN, sequence)
        }
        EncodeCommand::Location { position, sequence } => {
            encode_location(&sample(&position), sequence, &mut buf);
            (PROTOCOL_LOCATION, sequence)
        }
        EncodeCommand::Command { text, sequence } => {
            encode_command(&text, sequence, &mut buf)
                .map_err(|err| frame_error("encode command failed", err))?;
            (PROTOCOL_COMMAND, sequence)
        }
    };

    print_encoded(protocol, sequence, &buf, format);
    Ok(SUCCESS)
}

/// A sample at the given position, stamped with the current UTC time.
pub fn sample(position: &PositionArgs) -> TelemetrySample {
    TelemetrySample::now(position.lat, position.lon)
        .with_speed(position.speed)
        .with_accuracy(position.accuracy)
        .with_altitude(position.altitude)
}
