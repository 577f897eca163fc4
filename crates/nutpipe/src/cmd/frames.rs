use nutpipe_codec::{NutReader, Rational};

use crate::cmd::{open_input, FramesArgs};
use crate::exit::{codec_error, CliResult, SUCCESS};
use crate::output::{frame_summary, print_frame, OutputFormat};

pub fn run(args: FramesArgs, format: OutputFormat) -> CliResult<i32> {
    let input = open_input(&args.input)?;
    let mut reader = NutReader::new(input);
    reader
        .read_headers()
        .map_err(|e| codec_error("cannot read container headers", e))?;

    let time_bases = resolved_time_bases(&reader);
    let mut shown = 0u64;
    loop {
        let frame = match reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => return Err(codec_error("cannot read frame", e)),
        };
        if let Some(stream) = args.stream {
            if frame.stream_id != stream {
                continue;
            }
        }
        let tb = time_bases.get(frame.stream_id).copied();
        print_frame(&frame_summary(&frame, tb), format);
        shown += 1;
        if args.count.is_some_and(|limit| shown >= limit) {
            break;
        }
    }
    Ok(SUCCESS)
}

/// The time base of each stream, indexed by stream id.
pub fn resolved_time_bases<R: std::io::Read>(reader: &NutReader<R>) -> Vec<Rational> {
    let Some(main) = reader.main_header() else {
        return Vec::new();
    };
    reader
        .streams()
        .iter()
        .filter_map(|s| main.time_bases.get(s.time_base_id as usize).copied())
        .collect()
}
