//! Container reader.

use std::io::{ErrorKind, Read};

use tracing::debug;

use crate::error::{CodecError, Result};
use crate::flags::{
    has, FLAG_CHECKSUM, FLAG_CODED, FLAG_CODED_PTS, FLAG_EOR, FLAG_HEADER_IDX, FLAG_INVALID,
    FLAG_MATCH_TIME, FLAG_RESERVED, FLAG_SIZE_MSB, FLAG_SM_DATA, FLAG_STREAM_ID,
};
use crate::model::{lsb_to_full_pts, read_items, Frame, MainHeader, StreamHeader};
use crate::packet::{read_packet_body, read_startcode, MAGIC, MAIN_STARTCODE, STREAM_STARTCODE};
use crate::varint::{read_u32_be, read_u8, read_var_i64, read_var_u64, MAX_BLOB_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Unstarted,
    Streaming,
    Done,
}

/// Streaming reader for the container format.
///
/// Headers are read lazily on the first [`NutReader::next_frame`] call. A
/// stream that ends mid-frame is treated as a clean end of input, since a
/// terminated producer truncates wherever its last write stopped.
pub struct NutReader<R: Read> {
    src: R,
    state: ReaderState,
    main: Option<MainHeader>,
    streams: Vec<StreamHeader>,
    last_pts: Vec<i64>,
}

impl<R: Read> NutReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            state: ReaderState::Unstarted,
            main: None,
            streams: Vec::new(),
            last_pts: Vec::new(),
        }
    }

    /// Read the file magic, main header and stream headers. Idempotent;
    /// called automatically by the first [`NutReader::next_frame`].
    pub fn read_headers(&mut self) -> Result<()> {
        if self.state != ReaderState::Unstarted {
            return Ok(());
        }

        let mut magic = [0u8; MAGIC.len()];
        self.src.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CodecError::BadMagic);
        }

        let startcode = read_startcode(&mut self.src)?;
        if startcode != MAIN_STARTCODE {
            return Err(CodecError::MalformedContainer(format!(
                "expected main header startcode, found {startcode:#018x}"
            )));
        }
        let payload = read_packet_body(&mut self.src, startcode)?;
        let main = MainHeader::read(&mut payload.as_ref())?;

        if main.stream_count == 0 || main.stream_count > 256 {
            return Err(CodecError::MalformedContainer(format!(
                "implausible stream count {}",
                main.stream_count
            )));
        }

        let mut streams: Vec<Option<StreamHeader>> = vec![None; main.stream_count];
        for _ in 0..main.stream_count {
            let startcode = read_startcode(&mut self.src)?;
            if startcode != STREAM_STARTCODE {
                return Err(CodecError::MalformedContainer(format!(
                    "expected stream header startcode, found {startcode:#018x}"
                )));
            }
            let payload = read_packet_body(&mut self.src, startcode)?;
            let header = StreamHeader::read(&mut payload.as_ref())?;

            let id = header.stream_id as usize;
            if id >= main.stream_count {
                return Err(CodecError::MalformedContainer(format!(
                    "stream id {id} out of range for {} streams",
                    main.stream_count
                )));
            }
            if header.time_base_id as usize >= main.time_bases.len() {
                return Err(CodecError::MalformedContainer(format!(
                    "stream {id} references undeclared time base {}",
                    header.time_base_id
                )));
            }
            if streams[id].is_some() {
                return Err(CodecError::MalformedContainer(format!(
                    "duplicate header for stream {id}"
                )));
            }
            streams[id] = Some(header);
        }

        self.streams = streams
            .into_iter()
            .map(|s| {
                s.ok_or_else(|| {
                    CodecError::MalformedContainer("missing stream header".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.last_pts = vec![0i64; self.streams.len()];
        debug!(
            streams = self.streams.len(),
            time_bases = main.time_bases.len(),
            "container headers read"
        );
        self.main = Some(main);
        self.state = ReaderState::Streaming;
        Ok(())
    }

    pub fn main_header(&self) -> Option<&MainHeader> {
        self.main.as_ref()
    }

    pub fn streams(&self) -> &[StreamHeader] {
        &self.streams
    }

    /// The next frame, or `None` at end of input. Dataless frames that are
    /// not end-of-relevance markers are skipped.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                ReaderState::Done => return Ok(None),
                ReaderState::Unstarted => self.read_headers()?,
                ReaderState::Streaming => {}
            }

            let code = match read_u8(&mut self.src) {
                Ok(code) => code,
                Err(CodecError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match self.read_frame_body(code) {
                Ok(frame) => {
                    if frame.data.is_empty() && !frame.eor {
                        debug!(
                            stream_id = frame.stream_id,
                            pts = frame.pts,
                            "skipping dataless frame"
                        );
                        continue;
                    }
                    return Ok(Some(frame));
                }
                Err(CodecError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    // A killed producer stops writing wherever it was.
                    debug!("input truncated mid-frame, treating as end of stream");
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn read_frame_body(&mut self, code: u8) -> Result<Frame> {
        let Some(main) = self.main.as_ref() else {
            return Err(CodecError::MalformedContainer(
                "frame before headers".to_string(),
            ));
        };
        let entry = *main.frame_codes.get(code);
        let time_base_count = main.time_bases.len() as u64;
        if has(entry.flags, FLAG_INVALID) {
            return Err(CodecError::MalformedContainer(format!(
                "invalid frame code {code:#04x}"
            )));
        }

        let mut flags = entry.flags;
        if has(flags, FLAG_CODED) {
            flags ^= read_var_u64(&mut self.src)?;
        }

        let stream_id = if has(flags, FLAG_STREAM_ID) {
            read_var_u64(&mut self.src)? as usize
        } else {
            entry.stream_id as usize
        };
        if stream_id >= self.streams.len() {
            return Err(CodecError::MalformedContainer(format!(
                "frame for undeclared stream {stream_id}"
            )));
        }

        let pts = if has(flags, FLAG_CODED_PTS) {
            let coded = read_var_u64(&mut self.src)?;
            let shift = self.streams[stream_id].msb_pts_shift;
            let mask = (1u64 << shift) - 1;
            if coded <= mask {
                lsb_to_full_pts(self.last_pts[stream_id], shift, coded as i64)
            } else {
                (coded - mask - 1) as i64
            }
        } else {
            self.last_pts[stream_id] + entry.pts_delta
        };

        let mut size = entry.data_size_lsb;
        if has(flags, FLAG_SIZE_MSB) {
            let msb = read_var_u64(&mut self.src)?;
            size = entry
                .data_size_mul
                .checked_mul(msb)
                .and_then(|v| v.checked_add(size))
                .ok_or_else(|| {
                    CodecError::MalformedContainer(format!("frame size overflows (msb {msb})"))
                })?;
        }

        if has(flags, FLAG_MATCH_TIME) {
            read_var_i64(&mut self.src)?;
        }
        if has(flags, FLAG_HEADER_IDX) {
            read_var_u64(&mut self.src)?;
        }
        let reserved = if has(flags, FLAG_RESERVED) {
            read_var_u64(&mut self.src)?
        } else {
            entry.reserved_count
        };
        for _ in 0..reserved {
            read_var_u64(&mut self.src)?;
        }
        if has(flags, FLAG_CHECKSUM) {
            // Present on large frames; consumed without verification.
            read_u32_be(&mut self.src)?;
        }

        let (side_data, meta_data) = if has(flags, FLAG_SM_DATA) {
            (
                read_items(&mut self.src, time_base_count)?,
                read_items(&mut self.src, time_base_count)?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let eor = has(flags, FLAG_EOR);
        if eor && size != 0 {
            return Err(CodecError::MalformedContainer(format!(
                "end-of-relevance frame with {size} data bytes"
            )));
        }
        let size = size as usize;
        if size > MAX_BLOB_LEN {
            return Err(CodecError::PayloadTooLarge {
                size,
                max: MAX_BLOB_LEN,
            });
        }
        let mut data = vec![0u8; size];
        self.src.read_exact(&mut data)?;

        self.last_pts[stream_id] = pts;
        Ok(Frame {
            stream_id,
            pts,
            data: data.into(),
            side_data,
            meta_data,
            eor,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::model::{AudioParams, DataItem, DataValue, Rational, StreamKind, VideoParams};
    use crate::writer::NutWriter;

    fn video_stream(stream_id: u64) -> StreamHeader {
        StreamHeader {
            stream_id,
            kind: StreamKind::Video,
            fourcc: Bytes::from_static(&[24, b'B', b'G', b'R']),
            time_base_id: 0,
            msb_pts_shift: 7,
            max_pts_distance: 25,
            decode_delay: 0,
            flags: 0,
            codec_specific: Bytes::new(),
            video: Some(VideoParams {
                width: 64,
                height: 48,
                sample_width: 1,
                sample_height: 1,
                colourspace: 0,
            }),
            audio: None,
        }
    }

    fn audio_stream(stream_id: u64) -> StreamHeader {
        StreamHeader {
            stream_id,
            kind: StreamKind::Audio,
            fourcc: Bytes::from_static(b"PSB\x20"),
            time_base_id: 0,
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

    fn write_container(frames: &[Frame]) -> Vec<u8> {
        let mut writer = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 25)],
            vec![video_stream(0)],
        )
        .unwrap();
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.finish().unwrap();
        writer.into_inner()
    }

    #[test]
    fn roundtrip_sequential_frames() {
        let frames: Vec<Frame> = (1..=10)
            .map(|pts| Frame::new(0, pts, vec![pts as u8; 100]))
            .collect();
        let wire = write_container(&frames);

        let mut reader = NutReader::new(Cursor::new(wire));
        for expected in &frames {
            let frame = reader.next_frame().unwrap().unwrap();
            assert_eq!(frame.stream_id, 0);
            assert_eq!(frame.pts, expected.pts);
            assert_eq!(frame.data, expected.data);
            assert!(!frame.eor);
        }
        let eor = reader.next_frame().unwrap().unwrap();
        assert!(eor.eor);
        assert_eq!(eor.pts, 10);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn roundtrip_pts_jump_uses_escape_code() {
        let frames = vec![
            Frame::new(0, 1, vec![1u8; 10]),
            Frame::new(0, 500, vec![2u8; 10]),
            Frame::new(0, 501, vec![3u8; 10]),
        ];
        let wire = write_container(&frames);

        let mut reader = NutReader::new(Cursor::new(wire));
        let pts: Vec<i64> = std::iter::from_fn(|| reader.next_frame().unwrap())
            .take_while(|f| !f.eor)
            .map(|f| f.pts)
            .collect();
        assert_eq!(pts, vec![1, 500, 501]);
    }

    #[test]
    fn roundtrip_large_frame() {
        // Exceeds max_distance, so the frame carries a checksum field.
        let frames = vec![Frame::new(0, 1, vec![0x5Au8; 100_000])];
        let wire = write_container(&frames);

        let mut reader = NutReader::new(Cursor::new(wire));
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.data.len(), 100_000);
    }

    #[test]
    fn roundtrip_side_and_meta_data() {
        let mut frame = Frame::new(0, 1, vec![9u8; 32]);
        frame.side_data.push(DataItem::new("dts", DataValue::Int(-2)));
        frame
            .meta_data
            .push(DataItem::new("lang", DataValue::Utf8("eng".to_string())));
        let wire = write_container(&[frame.clone()]);

        let mut reader = NutReader::new(Cursor::new(wire));
        let decoded = reader.next_frame().unwrap().unwrap();
        assert_eq!(decoded.side_data, frame.side_data);
        assert_eq!(decoded.meta_data, frame.meta_data);
    }

    #[test]
    fn dataless_frames_are_skipped() {
        let frames = vec![
            Frame::new(0, 1, vec![1u8; 8]),
            Frame::new(0, 2, Vec::<u8>::new()),
            Frame::new(0, 3, vec![3u8; 8]),
        ];
        let wire = write_container(&frames);

        let mut reader = NutReader::new(Cursor::new(wire));
        let pts: Vec<i64> = std::iter::from_fn(|| reader.next_frame().unwrap())
            .take_while(|f| !f.eor)
            .map(|f| f.pts)
            .collect();
        assert_eq!(pts, vec![1, 3]);
    }

    #[test]
    fn truncated_input_ends_cleanly() {
        let frames = vec![
            Frame::new(0, 1, vec![1u8; 200]),
            Frame::new(0, 2, vec![2u8; 200]),
        ];
        let mut wire = write_container(&frames);
        // Cut into the second frame's payload.
        wire.truncate(wire.len() - 100);

        let mut reader = NutReader::new(Cursor::new(wire));
        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.pts, 1);
        assert!(reader.next_frame().unwrap().is_none());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut reader = NutReader::new(Cursor::new(b"definitely not a container".to_vec()));
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, CodecError::BadMagic));
    }

    #[test]
    fn reserved_code_byte_is_an_invalid_frame() {
        let mut wire = write_container(&[Frame::new(0, 1, vec![1u8; 8])]);
        wire.push(b'N');
        wire.extend_from_slice(&[0u8; 16]);

        let mut reader = NutReader::new(Cursor::new(wire));
        loop {
            match reader.next_frame() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected an invalid frame code error"),
                Err(err) => {
                    assert!(matches!(err, CodecError::MalformedContainer(_)));
                    break;
                }
            }
        }
    }

    #[test]
    fn multiple_streams_interleave() {
        let mut writer = NutWriter::new(
            Vec::new(),
            vec![Rational::new(1, 25), Rational::new(1, 44100)],
            vec![video_stream(0), {
                let mut a = audio_stream(1);
                a.time_base_id = 1;
                a
            }],
        )
        .unwrap();
        for pts in 1..=5 {
            writer.write_frame(&Frame::new(0, pts, vec![0u8; 10])).unwrap();
            writer.write_frame(&Frame::new(1, pts, vec![1u8; 10])).unwrap();
        }
        writer.finish().unwrap();
        let wire = writer.into_inner();

        let mut reader = NutReader::new(Cursor::new(wire));
        let mut seen = vec![0usize; 2];
        let mut eors = 0;
        while let Some(frame) = reader.next_frame().unwrap() {
            if frame.eor {
                eors += 1;
            } else {
                seen[frame.stream_id] += 1;
            }
        }
        assert_eq!(seen, vec![5, 5]);
        assert_eq!(eors, 2);
        assert_eq!(reader.streams()[1].kind, StreamKind::Audio);
    }
}
