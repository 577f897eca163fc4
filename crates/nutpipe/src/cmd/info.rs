use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nutpipe_codec::NutReader;
use serde::Serialize;

use crate::cmd::{open_input, InfoArgs};
use crate::exit::{codec_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{fourcc_display, OutputFormat};

#[derive(Serialize)]
struct StreamInfo {
    id: u64,
    kind: String,
    fourcc: String,
    time_base: String,
    msb_pts_shift: u64,
    max_pts_distance: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u64>,
}

#[derive(Serialize)]
struct ContainerInfo {
    version: String,
    stream_count: usize,
    max_distance: u64,
    time_bases: Vec<String>,
    streams: Vec<StreamInfo>,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let input = open_input(&args.input)?;
    let mut reader = NutReader::new(input);
    reader
        .read_headers()
        .map_err(|e| codec_error("cannot read container headers", e))?;

    let Some(main) = reader.main_header() else {
        return Err(CliError::new(INTERNAL, "header state missing after parse"));
    };

    let streams = reader
        .streams()
        .iter()
        .map(|s| {
            let time_base = main
                .time_bases
                .get(s.time_base_id as usize)
                .map_or_else(|| "?".to_string(), |tb| tb.to_string());
            StreamInfo {
                id: s.stream_id,
                kind: s.kind.to_string(),
                fourcc: fourcc_display(&s.fourcc),
                time_base,
                msb_pts_shift: s.msb_pts_shift,
                max_pts_distance: s.max_pts_distance,
                width: s.video.map(|v| v.width),
                height: s.video.map(|v| v.height),
                sample_rate: s.audio.map(|a| a.sample_rate.to_string()),
                channels: s.audio.map(|a| a.channel_count),
            }
        })
        .collect();

    let out = ContainerInfo {
        version: format!("{}.{}", main.major_version, main.minor_version),
        stream_count: main.stream_count,
        max_distance: main.max_distance,
        time_bases: main.time_bases.iter().map(|tb| tb.to_string()).collect(),
        streams,
    };

    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &ContainerInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            println!(
                "container version {}  max_distance {}  time bases [{}]",
                out.version,
                out.max_distance,
                out.time_bases.join(", ")
            );
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "ID", "KIND", "FOURCC", "TIME BASE", "GEOMETRY", "RATE",
                ]);
            for s in &out.streams {
                let geometry = match (s.width, s.height) {
                    (Some(w), Some(h)) => format!("{w}x{h}"),
                    _ => "-".to_string(),
                };
                let rate = match (&s.sample_rate, s.channels) {
                    (Some(rate), Some(ch)) => format!("{rate} Hz x{ch}"),
                    _ => "-".to_string(),
                };
                table.add_row(vec![
                    s.id.to_string(),
                    s.kind.clone(),
                    s.fourcc.clone(),
                    s.time_base.clone(),
                    geometry,
                    rate,
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Container:");
            println!("  Version:      {}", out.version);
            println!("  Streams:      {}", out.stream_count);
            println!("  Max distance: {}", out.max_distance);
            println!("  Time bases:   {}", out.time_bases.join(", "));
            for s in &out.streams {
                println!("Stream {} ({}):", s.id, s.kind);
                println!("  Fourcc:        {}", s.fourcc);
                println!("  Time base:     {}", s.time_base);
                if let (Some(w), Some(h)) = (s.width, s.height) {
                    println!("  Geometry:      {w}x{h}");
                }
                if let (Some(rate), Some(ch)) = (&s.sample_rate, s.channels) {
                    println!("  Sample rate:   {rate} Hz, {ch} channel(s)");
                }
            }
        }
    }
}
