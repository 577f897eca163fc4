use std::io::BufReader;

use nutpipe_codec::NutReader;
use nutpipe_transport::TcpNegotiator;
use tracing::info;

use crate::cmd::{frames::resolved_time_bases, ListenArgs};
use crate::exit::{
    codec_error, transport_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS,
};
use crate::output::{frame_summary, print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let negotiator =
        TcpNegotiator::bind().map_err(|e| transport_error("cannot bind listener", e))?;

    // The URL goes to stdout so scripts can hand it straight to the peer.
    println!("tcp://{}", negotiator.endpoint());

    let cancel = negotiator.cancel_handle();
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || ctrlc_cancel.cancel())
        .map_err(|e| CliError::new(INTERNAL, format!("cannot install signal handler: {e}")))?;

    let stream = match negotiator.negotiate() {
        Ok(stream) => stream,
        Err(e) if e.is_cancelled() => return Ok(INTERRUPTED),
        Err(e) => return Err(transport_error("negotiation failed", e)),
    };
    info!("peer connected, reading container");

    let mut reader = NutReader::new(BufReader::new(stream));
    reader
        .read_headers()
        .map_err(|e| codec_error("cannot read container headers", e))?;
    let time_bases = resolved_time_bases(&reader);

    let mut shown = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Ok(INTERRUPTED);
        }
        let frame = match reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => return Err(codec_error("cannot read frame", e)),
        };
        let tb = time_bases.get(frame.stream_id).copied();
        print_frame(&frame_summary(&frame, tb), format);
        shown += 1;
        if args.count.is_some_and(|limit| shown >= limit) {
            break;
        }
    }
    Ok(SUCCESS)
}
