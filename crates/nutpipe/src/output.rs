use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nutpipe_codec::{DataItem, DataValue, Frame, Rational};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Render a fourcc with non-printable bytes as decimal, e.g. `[24]BGR`.
pub fn fourcc_display(fourcc: &[u8]) -> String {
    fourcc
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() {
                (b as char).to_string()
            } else {
                format!("[{b}]")
            }
        })
        .collect()
}

#[derive(Serialize)]
pub struct FrameSummary {
    pub stream_id: usize,
    pub pts: i64,
    pub pts_ms: Option<i64>,
    pub size: usize,
    pub eor: bool,
    pub items: Vec<String>,
}

pub fn frame_summary(frame: &Frame, time_base: Option<Rational>) -> FrameSummary {
    FrameSummary {
        stream_id: frame.stream_id,
        pts: frame.pts,
        pts_ms: time_base.map(|tb| tb.millis(frame.pts)),
        size: frame.data.len(),
        eor: frame.eor,
        items: frame
            .side_data
            .iter()
            .chain(frame.meta_data.iter())
            .map(item_display)
            .collect(),
    }
}

pub fn print_frame(summary: &FrameSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STREAM", "PTS", "MS", "SIZE", "EOR", "ITEMS"])
                .add_row(vec![
                    summary.stream_id.to_string(),
                    summary.pts.to_string(),
                    summary
                        .pts_ms
                        .map_or_else(|| "-".to_string(), |ms| ms.to_string()),
                    summary.size.to_string(),
                    if summary.eor { "yes" } else { "no" }.to_string(),
                    summary.items.join(" "),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let ms = summary
                .pts_ms
                .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
            let items = if summary.items.is_empty() {
                String::new()
            } else {
                format!(" items=[{}]", summary.items.join(", "))
            };
            println!(
                "stream={} pts={} ({}) size={}{}{}",
                summary.stream_id,
                summary.pts,
                ms,
                summary.size,
                if summary.eor { " eor" } else { "" },
                items
            );
        }
    }
}

fn item_display(item: &DataItem) -> String {
    match &item.value {
        DataValue::UInt(v) => format!("{}={v}", item.name),
        DataValue::Int(v) => format!("{}={v}", item.name),
        DataValue::Utf8(s) => format!("{}={s:?}", item.name),
        DataValue::Raw { kind, data } => format!(
            "{}=<{} {} bytes>",
            item.name,
            fourcc_display(kind),
            data.len()
        ),
        DataValue::Timestamp(ts) => {
            format!("{}=@{}tb{}", item.name, ts.pts, ts.time_base_id)
        }
        DataValue::Rational(r) => format!("{}={r}", item.name),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn fourcc_mixes_printable_and_decimal() {
        assert_eq!(fourcc_display(&[24, b'B', b'G', b'R']), "[24]BGR");
        assert_eq!(fourcc_display(b"PSB\x20"), "PSB[32]");
    }

    #[test]
    fn summary_converts_pts_to_millis() {
        let frame = Frame::new(0, 50, Bytes::from_static(b"abc"));
        let summary = frame_summary(&frame, Some(Rational::new(1, 25)));
        assert_eq!(summary.pts_ms, Some(2000));
        assert_eq!(summary.size, 3);
    }

    #[test]
    fn items_render_inline() {
        let mut frame = Frame::new(1, 0, Bytes::new());
        frame
            .meta_data
            .push(DataItem::new("lang", DataValue::Utf8("eng".to_string())));
        let summary = frame_summary(&frame, None);
        assert_eq!(summary.items, vec!["lang=\"eng\"".to_string()]);
    }
}
