//! Structural value types of the container: headers, frames, data items.

use std::fmt;
use std::io::Read;

use bytes::{Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::flags::FLAG_INVALID;
use crate::table::FrameCodeTable;
use crate::varint::{
    read_blob, read_var_i64, read_var_u64, write_blob, write_var_i64, write_var_u64,
};

/// Container version written by this implementation. Versions above 3 carry
/// a minor version and a trailing main-flags field.
pub const MAJOR_VERSION: u64 = 4;
pub const MINOR_VERSION: u64 = 0;

/// A rational number, used for time bases and audio sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub fn new(num: i64, den: i64) -> Self {
        debug_assert!(den != 0, "rational denominator must be nonzero");
        Self { num, den }
    }

    /// Convert a pts in this time base to milliseconds.
    pub fn millis(&self, pts: i64) -> i64 {
        (i128::from(pts) * 1000 * i128::from(self.num) / i128::from(self.den)) as i64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A presentation timestamp tied to one of the main header's time bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub time_base_id: u64,
    pub pts: i64,
}

/// A small tagged value attached to frames as side or meta data.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Utf8(String),
    Raw { kind: Bytes, data: Bytes },
    Int(i64),
    Timestamp(Timestamp),
    Rational(Rational),
    UInt(u64),
}

/// A named data item.
#[derive(Debug, Clone, PartialEq)]
pub struct DataItem {
    pub name: String,
    pub value: DataValue,
}

impl DataItem {
    pub fn new(name: impl Into<String>, value: DataValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    fn read(r: &mut impl Read, time_base_count: u64) -> Result<Self> {
        let name = read_utf8(r)?;
        let tag = read_var_i64(r)?;
        let value = match tag {
            v if v >= 0 => DataValue::UInt(v as u64),
            -1 => DataValue::Utf8(read_utf8(r)?),
            -2 => DataValue::Raw {
                kind: read_blob(r)?,
                data: read_blob(r)?,
            },
            -3 => DataValue::Int(read_var_i64(r)?),
            -4 => {
                if time_base_count == 0 {
                    return Err(CodecError::MalformedContainer(
                        "timestamp item without time bases".to_string(),
                    ));
                }
                let coded = read_var_u64(r)?;
                DataValue::Timestamp(Timestamp {
                    time_base_id: coded % time_base_count,
                    pts: (coded / time_base_count) as i64,
                })
            }
            v => DataValue::Rational(Rational::new(read_var_i64(r)?, -v - 4)),
        };
        Ok(Self { name, value })
    }

    fn write(&self, buf: &mut BytesMut, time_base_count: u64) {
        write_blob(buf, self.name.as_bytes());
        match &self.value {
            DataValue::UInt(v) => write_var_i64(buf, *v as i64),
            DataValue::Utf8(s) => {
                write_var_i64(buf, -1);
                write_blob(buf, s.as_bytes());
            }
            DataValue::Raw { kind, data } => {
                write_var_i64(buf, -2);
                write_blob(buf, kind);
                write_blob(buf, data);
            }
            DataValue::Int(v) => {
                write_var_i64(buf, -3);
                write_var_i64(buf, *v);
            }
            DataValue::Timestamp(ts) => {
                write_var_i64(buf, -4);
                write_var_u64(buf, (ts.pts as u64) * time_base_count + ts.time_base_id);
            }
            DataValue::Rational(r) => {
                write_var_i64(buf, -4 - r.den);
                write_var_i64(buf, r.num);
            }
        }
    }
}

/// Read a counted list of data items.
pub fn read_items(r: &mut impl Read, time_base_count: u64) -> Result<Vec<DataItem>> {
    let count = read_var_u64(r)? as usize;
    if count > 4096 {
        return Err(CodecError::MalformedContainer(format!(
            "implausible data item count {count}"
        )));
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(DataItem::read(r, time_base_count)?);
    }
    Ok(items)
}

/// Write a counted list of data items.
pub fn write_items(buf: &mut BytesMut, items: &[DataItem], time_base_count: u64) {
    write_var_u64(buf, items.len() as u64);
    for item in items {
        item.write(buf, time_base_count);
    }
}

fn read_utf8(r: &mut impl Read) -> Result<String> {
    let blob = read_blob(r)?;
    String::from_utf8(blob.to_vec())
        .map_err(|_| CodecError::MalformedContainer("invalid UTF-8 in data item".to_string()))
}

/// Reconstruct a full pts from its low bits, picking the value closest to
/// the stream's previous pts.
pub fn lsb_to_full_pts(last_pts: i64, msb_pts_shift: u64, lsb: i64) -> i64 {
    let mask = (1i64 << msb_pts_shift) - 1;
    let delta = last_pts - mask / 2;
    ((lsb - delta) & mask) + delta
}

/// One equivalence class of frames, compressed into a single code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCode {
    pub flags: u64,
    pub stream_id: u64,
    pub data_size_mul: u64,
    pub data_size_lsb: u64,
    pub pts_delta: i64,
    pub reserved_count: u64,
    pub match_time_delta: i64,
    pub header_idx: u64,
}

/// Sentinel for an unspecified match-time delta.
pub const MATCH_UNKNOWN: i64 = 1 - (1i64 << 62);

impl Default for FrameCode {
    fn default() -> Self {
        Self {
            flags: FLAG_INVALID,
            stream_id: 0,
            data_size_mul: 1,
            data_size_lsb: 0,
            pts_delta: 0,
            reserved_count: 0,
            match_time_delta: MATCH_UNKNOWN,
            header_idx: 0,
        }
    }
}

/// The main header of the container.
#[derive(Debug, Clone)]
pub struct MainHeader {
    pub major_version: u64,
    pub minor_version: u64,
    pub stream_count: usize,
    pub max_distance: u64,
    pub time_bases: Vec<Rational>,
    pub frame_codes: FrameCodeTable,
    /// Elision headers; always empty on write, carried verbatim on read.
    pub elision_headers: Vec<Bytes>,
    /// Main-header flags; always zero on write.
    pub flags: u64,
}

impl MainHeader {
    pub fn write(&self, buf: &mut BytesMut) {
        write_var_u64(buf, self.major_version);
        if self.major_version > 3 {
            write_var_u64(buf, self.minor_version);
        }
        write_var_u64(buf, self.stream_count as u64);
        write_var_u64(buf, self.max_distance);
        write_var_u64(buf, self.time_bases.len() as u64);
        for tb in &self.time_bases {
            write_var_u64(buf, tb.num as u64);
            write_var_u64(buf, tb.den as u64);
        }
        self.frame_codes.write(buf);
        write_var_u64(buf, self.elision_headers.len() as u64);
        for header in &self.elision_headers {
            write_blob(buf, header);
        }
        if self.major_version > 3 {
            write_var_u64(buf, self.flags);
        }
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let major_version = read_var_u64(r)?;
        if !(3..=MAJOR_VERSION).contains(&major_version) {
            return Err(CodecError::MalformedContainer(format!(
                "unsupported container version {major_version}"
            )));
        }
        let minor_version = if major_version > 3 {
            read_var_u64(r)?
        } else {
            0
        };
        let stream_count = read_var_u64(r)? as usize;
        let max_distance = read_var_u64(r)?;

        let time_base_count = read_var_u64(r)? as usize;
        if time_base_count == 0 || time_base_count > 64 {
            return Err(CodecError::MalformedContainer(format!(
                "implausible time base count {time_base_count}"
            )));
        }
        let mut time_bases = Vec::with_capacity(time_base_count);
        for _ in 0..time_base_count {
            let num = read_var_u64(r)? as i64;
            let den = read_var_u64(r)? as i64;
            if num <= 0 || den <= 0 {
                return Err(CodecError::MalformedContainer(format!(
                    "invalid time base {num}/{den}"
                )));
            }
            time_bases.push(Rational::new(num, den));
        }

        let frame_codes = FrameCodeTable::read(r)?;

        let elision_count = read_var_u64(r)? as usize;
        if elision_count > 128 {
            return Err(CodecError::MalformedContainer(format!(
                "implausible elision header count {elision_count}"
            )));
        }
        let mut elision_headers = Vec::with_capacity(elision_count);
        for _ in 0..elision_count {
            elision_headers.push(read_blob(r)?);
        }

        let flags = if major_version > 3 { read_var_u64(r)? } else { 0 };

        Ok(Self {
            major_version,
            minor_version,
            stream_count,
            max_distance,
            time_bases,
            frame_codes,
            elision_headers,
            flags,
        })
    }
}

/// The class of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn to_class(self) -> u64 {
        match self {
            StreamKind::Video => 0,
            StreamKind::Audio => 1,
        }
    }

    fn from_class(class: u64) -> Result<Self> {
        match class {
            0 => Ok(StreamKind::Video),
            1 => Ok(StreamKind::Audio),
            other => Err(CodecError::MalformedContainer(format!(
                "unsupported stream class {other}"
            ))),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// Video-specific stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u64,
    pub height: u64,
    pub sample_width: u64,
    pub sample_height: u64,
    pub colourspace: u64,
}

/// Audio-specific stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub sample_rate: Rational,
    pub channel_count: u64,
}

/// A per-stream header.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    pub stream_id: u64,
    pub kind: StreamKind,
    pub fourcc: Bytes,
    pub time_base_id: u64,
    pub msb_pts_shift: u64,
    pub max_pts_distance: u64,
    pub decode_delay: u64,
    pub flags: u64,
    pub codec_specific: Bytes,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
}

impl StreamHeader {
    pub fn write(&self, buf: &mut BytesMut) {
        write_var_u64(buf, self.stream_id);
        write_var_u64(buf, self.kind.to_class());
        write_blob(buf, &self.fourcc);
        write_var_u64(buf, self.time_base_id);
        write_var_u64(buf, self.msb_pts_shift);
        write_var_u64(buf, self.max_pts_distance);
        write_var_u64(buf, self.decode_delay);
        write_var_u64(buf, self.flags);
        write_blob(buf, &self.codec_specific);
        match self.kind {
            StreamKind::Video => {
                let v = self.video.unwrap_or(VideoParams {
                    width: 0,
                    height: 0,
                    sample_width: 0,
                    sample_height: 0,
                    colourspace: 0,
                });
                write_var_u64(buf, v.width);
                write_var_u64(buf, v.height);
                write_var_u64(buf, v.sample_width);
                write_var_u64(buf, v.sample_height);
                write_var_u64(buf, v.colourspace);
            }
            StreamKind::Audio => {
                let a = self.audio.unwrap_or(AudioParams {
                    sample_rate: Rational::new(0, 1),
                    channel_count: 0,
                });
                write_var_u64(buf, a.sample_rate.num as u64);
                write_var_u64(buf, a.sample_rate.den as u64);
                write_var_u64(buf, a.channel_count);
            }
        }
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let stream_id = read_var_u64(r)?;
        let kind = StreamKind::from_class(read_var_u64(r)?)?;
        let fourcc = read_blob(r)?;
        let time_base_id = read_var_u64(r)?;
        let msb_pts_shift = read_var_u64(r)?;
        if msb_pts_shift >= 16 {
            return Err(CodecError::MalformedContainer(format!(
                "implausible msb pts shift {msb_pts_shift}"
            )));
        }
        let max_pts_distance = read_var_u64(r)?;
        let decode_delay = read_var_u64(r)?;
        let flags = read_var_u64(r)?;
        let codec_specific = read_blob(r)?;

        let (video, audio) = match kind {
            StreamKind::Video => {
                let video = VideoParams {
                    width: read_var_u64(r)?,
                    height: read_var_u64(r)?,
                    sample_width: read_var_u64(r)?,
                    sample_height: read_var_u64(r)?,
                    colourspace: read_var_u64(r)?,
                };
                (Some(video), None)
            }
            StreamKind::Audio => {
                let num = read_var_u64(r)? as i64;
                let den = read_var_u64(r)? as i64;
                if den <= 0 {
                    return Err(CodecError::MalformedContainer(format!(
                        "invalid sample rate {num}/{den}"
                    )));
                }
                let audio = AudioParams {
                    sample_rate: Rational::new(num, den),
                    channel_count: read_var_u64(r)?,
                };
                (None, Some(audio))
            }
        };

        Ok(Self {
            stream_id,
            kind,
            fourcc,
            time_base_id,
            msb_pts_shift,
            max_pts_distance,
            decode_delay,
            flags,
            codec_specific,
            video,
            audio,
        })
    }
}

/// One multiplexed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub stream_id: usize,
    pub pts: i64,
    pub data: Bytes,
    pub side_data: Vec<DataItem>,
    pub meta_data: Vec<DataItem>,
    /// End-of-relevance marker; such frames carry no data.
    pub eor: bool,
}

impl Frame {
    pub fn new(stream_id: usize, pts: i64, data: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            pts,
            data: data.into(),
            side_data: Vec::new(),
            meta_data: Vec::new(),
            eor: false,
        }
    }

    /// An end-of-relevance frame for `stream_id`.
    pub fn end_of_relevance(stream_id: usize, pts: i64) -> Self {
        Self {
            stream_id,
            pts,
            data: Bytes::new(),
            side_data: Vec::new(),
            meta_data: Vec::new(),
            eor: true,
        }
    }
}
