use bytes::BytesMut;
use gt06link_frame::next_frame;
use tracing::warn;

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{parse_hex, print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex input: {err}")))?;

    let mut buf = BytesMut::from(bytes.as_slice());
    let mut found = 0usize;
    while let Some(frame) = next_frame(&mut buf) {
        print_frame(&frame, None, format);
        found += 1;
    }

    if !buf.is_empty() {
        warn!(leftover = buf.len(), "trailing bytes do not form a complete frame");
    }
    if found == 0 {
        return Err(CliError::new(DATA_INVALID, "no valid frame found in input"));
    }
    Ok(SUCCESS)
}
