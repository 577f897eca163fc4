//! Container writer.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::crc::checksum;
use crate::error::{CodecError, Result};
use crate::flags::{
    has, FLAG_CHECKSUM, FLAG_CODED, FLAG_CODED_PTS, FLAG_EOR, FLAG_KEY, FLAG_SIZE_MSB,
    FLAG_SM_DATA, FLAG_STREAM_ID,
};
use crate::model::{
    lsb_to_full_pts, write_items, Frame, MainHeader, Rational, StreamHeader, MAJOR_VERSION,
    MINOR_VERSION,
};
use crate::packet::{write_packet, MAGIC, MAIN_STARTCODE, STREAM_STARTCODE};
use crate::table::{FrameCodeTable, ESCAPE_CODE};
use crate::varint::write_var_u64;

/// Default distance above which frames carry their own checksum.
pub const DEFAULT_MAX_DISTANCE: u64 = 65536;

/// Streaming writer for the container format.
///
/// Headers are written lazily before the first frame; [`NutWriter::finish`]
/// closes every stream with an end-of-relevance frame and flushes the sink.
#[derive(Debug)]
pub struct NutWriter<W: Write> {
    sink: W,
    main: MainHeader,
    streams: Vec<StreamHeader>,
    last_pts: Vec<i64>,
    headers_written: bool,
    finished: bool,
}

impl<W: Write> NutWriter<W> {
    /// Create a writer for the given streams. Stream ids must be 0-based and
    /// contiguous, and every stream must reference a declared time base.
    pub fn new(sink: W, time_bases: Vec<Rational>, streams: Vec<StreamHeader>) -> Result<Self> {
        if time_bases.is_empty() {
            return Err(CodecError::InvalidStreamDeclaration(
                "at least one time base is required".to_string(),
            ));
        }
        if streams.is_empty() {
            return Err(CodecError::InvalidStreamDeclaration(
                "at least one stream is required".to_string(),
            ));
        }
        for (idx, stream) in streams.iter().enumerate() {
            if stream.stream_id != idx as u64 {
                return Err(CodecError::InvalidStreamDeclaration(format!(
                    "stream ids must be 0-based and contiguous (position {idx} declares id {})",
                    stream.stream_id
                )));
            }
            if stream.time_base_id as usize >= time_bases.len() {
                return Err(CodecError::InvalidStreamDeclaration(format!(
                    "stream {idx} references undeclared time base {}",
                    stream.time_base_id
                )));
            }
        }

        let stream_count = streams.len();
        let last_pts = vec![0i64; stream_count];
        let main = MainHeader {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            stream_count,
            max_distance: DEFAULT_MAX_DISTANCE,
            time_bases,
            frame_codes: FrameCodeTable::build(stream_count),
            elision_headers: Vec::new(),
            flags: 0,
        };

        Ok(Self {
            sink,
            main,
            streams,
            last_pts,
            headers_written: false,
            finished: false,
        })
    }

    /// Write the file magic, main header and stream headers. Idempotent;
    /// called automatically before the first frame.
    pub fn write_headers(&mut self) -> Result<()> {
        if self.headers_written {
            return Ok(());
        }
        self.sink.write_all(MAGIC)?;

        let mut buf = BytesMut::new();
        self.main.write(&mut buf);
        write_packet(&mut self.sink, MAIN_STARTCODE, &buf)?;

        for stream in &self.streams {
            let mut buf = BytesMut::new();
            stream.write(&mut buf);
            write_packet(&mut self.sink, STREAM_STARTCODE, &buf)?;
        }

        self.headers_written = true;
        debug!(streams = self.streams.len(), "container headers written");
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(CodecError::Finished);
        }
        self.write_headers()?;

        let stream_idx = frame.stream_id;
        if stream_idx >= self.streams.len() {
            return Err(CodecError::InvalidStreamDeclaration(format!(
                "frame for undeclared stream {stream_idx}"
            )));
        }

        let size = frame.data.len() as u64;
        let plain = !frame.eor
            && frame.side_data.is_empty()
            && frame.meta_data.is_empty()
            && frame.pts == self.last_pts[stream_idx] + 1
            && size <= self.main.max_distance;
        if plain {
            if let Some((code, size_msb)) = self.main.frame_codes.small_frame_code(stream_idx, size)
            {
                let mut header = BytesMut::new();
                header.put_u8(code);
                write_var_u64(&mut header, size_msb);
                self.sink.write_all(&header)?;
                self.sink.write_all(&frame.data)?;
                self.last_pts[stream_idx] = frame.pts;
                return Ok(());
            }
        }

        self.write_escape_frame(frame, size)
    }

    /// Write a frame through the escape code, which codes every field of the
    /// frame header explicitly.
    fn write_escape_frame(&mut self, frame: &Frame, size: u64) -> Result<()> {
        let stream_idx = frame.stream_id;
        let mut final_flags =
            FLAG_CODED | FLAG_KEY | FLAG_STREAM_ID | FLAG_CODED_PTS | FLAG_SIZE_MSB;
        if frame.eor {
            final_flags |= FLAG_EOR;
        }
        if !frame.side_data.is_empty() || !frame.meta_data.is_empty() {
            final_flags |= FLAG_SM_DATA;
        }
        if size > self.main.max_distance {
            final_flags |= FLAG_CHECKSUM;
        }
        let coded_flags = self.main.frame_codes.escape_entry().flags ^ final_flags;

        let mut header = BytesMut::new();
        header.put_u8(ESCAPE_CODE);
        write_var_u64(&mut header, coded_flags);
        write_var_u64(&mut header, stream_idx as u64);
        write_var_u64(&mut header, self.coded_pts(stream_idx, frame.pts));
        // The escape entry has mul 1 and lsb 0, so the msb is the full size.
        write_var_u64(&mut header, size);
        if has(final_flags, FLAG_CHECKSUM) {
            let crc = checksum(&header);
            header.put_u32(crc);
        }
        if has(final_flags, FLAG_SM_DATA) {
            let time_base_count = self.main.time_bases.len() as u64;
            write_items(&mut header, &frame.side_data, time_base_count);
            write_items(&mut header, &frame.meta_data, time_base_count);
        }

        self.sink.write_all(&header)?;
        self.sink.write_all(&frame.data)?;
        self.last_pts[stream_idx] = frame.pts;
        Ok(())
    }

    /// Code a pts in lsb form when it falls inside the window around the
    /// stream's previous pts, otherwise shifted past the lsb range.
    fn coded_pts(&self, stream_idx: usize, pts: i64) -> u64 {
        let shift = self.streams[stream_idx].msb_pts_shift;
        let mask = (1i64 << shift) - 1;
        let lsb = pts & mask;
        if lsb_to_full_pts(self.last_pts[stream_idx], shift, lsb) == pts {
            lsb as u64
        } else {
            (pts + mask + 1) as u64
        }
    }

    /// Close every stream with an end-of-relevance frame and flush the sink.
    /// Idempotent; frames written afterwards fail with
    /// [`CodecError::Finished`].
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.write_headers()?;
        for idx in 0..self.streams.len() {
            let eor = Frame::end_of_relevance(idx, self.last_pts[idx]);
            self.write_frame(&eor)?;
        }
        self.finished = true;
        self.sink.flush()?;
        debug!("container finished");
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::model::{AudioParams, StreamKind};
    use crate::table::RESERVED_CODE;

    fn audio_stream(stream_id: u64, time_base_id: u64) -> StreamHeader {
        StreamHeader {
            stream_id,
            kind: StreamKind::Audio,
            fourcc: Bytes::from_static(b"PSB\x20"),
            time_base_id,
            msb_pts_shift: 7,
            max_pts_distance: 44100,
            decode_delay: 0,
            flags: 0,
            codec_specific: Bytes::new(),
            video: None,
            audio: Some(AudioParams {
                sample_rate: Rational::new(44100, 1),
                channel_count: 1,
            }),
        }
    }

    #[test]
    fn rejects_non_contiguous_stream_ids() {
        let err = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 1000)],
            vec![audio_stream(1, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidStreamDeclaration(_)));
    }

    #[test]
    fn rejects_undeclared_time_base() {
        let err = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 1000)],
            vec![audio_stream(0, 3)],
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidStreamDeclaration(_)));
    }

    #[test]
    fn write_after_finish_fails() {
        let mut writer = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 1000)],
            vec![audio_stream(0, 0)],
        )
        .unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap(); // idempotent
        let err = writer
            .write_frame(&Frame::new(0, 1, Bytes::from_static(b"late")))
            .unwrap_err();
        assert!(matches!(err, CodecError::Finished));
    }

    #[test]
    fn output_begins_with_magic() {
        let mut writer = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 1000)],
            vec![audio_stream(0, 0)],
        )
        .unwrap();
        writer.write_headers().unwrap();
        let wire = writer.into_inner();
        assert!(wire.starts_with(MAGIC));
    }

    #[test]
    fn frame_codes_never_collide_with_startcodes() {
        // Every byte emitted as a frame code must differ from the reserved
        // startcode prefix.
        let mut writer = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 1000)],
            vec![audio_stream(0, 0)],
        )
        .unwrap();
        writer.write_headers().unwrap();
        let header_len = writer.into_inner().len();

        let mut writer = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 1000)],
            vec![audio_stream(0, 0)],
        )
        .unwrap();
        for pts in 1..40 {
            writer
                .write_frame(&Frame::new(0, pts, vec![0u8; pts as usize]))
                .unwrap();
        }
        let wire = writer.into_inner();
        assert_ne!(wire[header_len], RESERVED_CODE);
    }
}
