//! Mapping between stream descriptors and the container's wire model.

use bytes::{BufMut, Bytes, BytesMut};
use nutpipe_codec::{AudioParams, MainHeader, Rational, StreamHeader, StreamKind, VideoParams};

use crate::capability::{MediaFrame, StreamDescriptor};
use crate::error::{ExchangeError, Result};
use crate::image_format::ImageFormat;

/// Fourcc of interleaved signed 32-bit big-endian PCM.
pub const PCM_S32BE_FOURCC: [u8; 4] = [b'P', b'S', b'B', 32];

const DEFAULT_MSB_PTS_SHIFT: u64 = 7;

/// Translates between [`StreamDescriptor`]s plus [`MediaFrame`]s on one side
/// and stream headers plus raw payloads on the other. Each stream gets its
/// own time base: one frame for video, one sample for audio.
pub struct FrameAdapter {
    streams: Vec<StreamDescriptor>,
    format: Box<dyn ImageFormat>,
}

impl std::fmt::Debug for FrameAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAdapter")
            .field("streams", &self.streams)
            .field("format", &self.format.fourcc())
            .finish()
    }
}

impl FrameAdapter {
    pub fn new(streams: Vec<StreamDescriptor>, format: Box<dyn ImageFormat>) -> Self {
        Self { streams, format }
    }

    /// Build an adapter from headers read off the wire, checking that every
    /// stream uses a layout this side can decode.
    pub fn from_headers(
        main: &MainHeader,
        headers: &[StreamHeader],
        format: Box<dyn ImageFormat>,
    ) -> Result<Self> {
        let mut streams = Vec::with_capacity(headers.len());
        for header in headers {
            let time_base = main
                .time_bases
                .get(header.time_base_id as usize)
                .copied()
                .ok_or_else(|| {
                    ExchangeError::UnsupportedStream(format!(
                        "stream {} references undeclared time base",
                        header.stream_id
                    ))
                })?;
            match header.kind {
                StreamKind::Video => {
                    if header.fourcc.as_ref() != format.fourcc() {
                        return Err(ExchangeError::UnsupportedStream(format!(
                            "video stream {} uses fourcc {:02x?}",
                            header.stream_id,
                            header.fourcc.as_ref()
                        )));
                    }
                    let params = header.video.ok_or_else(|| {
                        ExchangeError::UnsupportedStream(format!(
                            "video stream {} lacks video parameters",
                            header.stream_id
                        ))
                    })?;
                    streams.push(StreamDescriptor::Video {
                        width: params.width as u32,
                        height: params.height as u32,
                        frame_rate: Rational::new(time_base.den, time_base.num),
                    });
                }
                StreamKind::Audio => {
                    if header.fourcc.as_ref() != PCM_S32BE_FOURCC {
                        return Err(ExchangeError::UnsupportedStream(format!(
                            "audio stream {} uses fourcc {:02x?}",
                            header.stream_id,
                            header.fourcc.as_ref()
                        )));
                    }
                    let params = header.audio.ok_or_else(|| {
                        ExchangeError::UnsupportedStream(format!(
                            "audio stream {} lacks audio parameters",
                            header.stream_id
                        ))
                    })?;
                    streams.push(StreamDescriptor::Audio {
                        sample_rate: (params.sample_rate.num / params.sample_rate.den) as u32,
                        channels: params.channel_count as u32,
                    });
                }
            }
        }
        Ok(Self { streams, format })
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// One time base per stream, indexed by stream id.
    pub fn time_bases(&self) -> Vec<Rational> {
        self.streams
            .iter()
            .map(|s| match s {
                StreamDescriptor::Video { frame_rate, .. } => {
                    Rational::new(frame_rate.den, frame_rate.num)
                }
                StreamDescriptor::Audio { sample_rate, .. } => {
                    Rational::new(1, i64::from(*sample_rate))
                }
            })
            .collect()
    }

    pub fn stream_headers(&self) -> Vec<StreamHeader> {
        self.streams
            .iter()
            .enumerate()
            .map(|(id, s)| match s {
                StreamDescriptor::Video {
                    width,
                    height,
                    frame_rate,
                } => StreamHeader {
                    stream_id: id as u64,
                    kind: StreamKind::Video,
                    fourcc: Bytes::copy_from_slice(&self.format.fourcc()),
                    time_base_id: id as u64,
                    msb_pts_shift: DEFAULT_MSB_PTS_SHIFT,
                    max_pts_distance: (frame_rate.num / frame_rate.den).max(1) as u64,
                    decode_delay: 0,
                    flags: 0,
                    codec_specific: Bytes::new(),
                    video: Some(VideoParams {
                        width: u64::from(*width),
                        height: u64::from(*height),
                        sample_width: 1,
                        sample_height: 1,
                        colourspace: 0,
                    }),
                    audio: None,
                },
                StreamDescriptor::Audio {
                    sample_rate,
                    channels,
                } => StreamHeader {
                    stream_id: id as u64,
                    kind: StreamKind::Audio,
                    fourcc: Bytes::copy_from_slice(&PCM_S32BE_FOURCC),
                    time_base_id: id as u64,
                    msb_pts_shift: DEFAULT_MSB_PTS_SHIFT,
                    max_pts_distance: u64::from(*sample_rate).max(1),
                    decode_delay: 0,
                    flags: 0,
                    codec_specific: Bytes::new(),
                    video: None,
                    audio: Some(AudioParams {
                        sample_rate: Rational::new(i64::from(*sample_rate), 1),
                        channel_count: u64::from(*channels),
                    }),
                },
            })
            .collect()
    }

    /// Pack a media frame into the payload bytes for `stream_id`.
    pub fn encode(&self, stream_id: usize, frame: &MediaFrame) -> Result<Bytes> {
        let descriptor = self.descriptor(stream_id)?;
        match (descriptor, frame) {
            (StreamDescriptor::Video { width, height, .. }, MediaFrame::Video(image)) => {
                if image.width() != *width || image.height() != *height {
                    return Err(ExchangeError::BadFrame(format!(
                        "image is {}x{}, stream {stream_id} is {width}x{height}",
                        image.width(),
                        image.height()
                    )));
                }
                Ok(self.format.encode(image))
            }
            (StreamDescriptor::Audio { channels, .. }, MediaFrame::Audio(samples)) => {
                if *channels != 0 && samples.len() % *channels as usize != 0 {
                    return Err(ExchangeError::BadFrame(format!(
                        "{} samples do not fill {channels} channels",
                        samples.len()
                    )));
                }
                let mut buf = BytesMut::with_capacity(samples.len() * 4);
                for sample in samples {
                    buf.put_i32(*sample);
                }
                Ok(buf.freeze())
            }
            (StreamDescriptor::Video { .. }, MediaFrame::Audio(_)) => Err(ExchangeError::BadFrame(
                format!("audio frame on video stream {stream_id}"),
            )),
            (StreamDescriptor::Audio { .. }, MediaFrame::Video(_)) => Err(ExchangeError::BadFrame(
                format!("video frame on audio stream {stream_id}"),
            )),
        }
    }

    /// Unpack a payload read from the wire.
    pub fn decode(&self, stream_id: usize, data: &[u8]) -> Result<MediaFrame> {
        match self.descriptor(stream_id)? {
            StreamDescriptor::Video { width, height, .. } => {
                Ok(MediaFrame::Video(self.format.decode(data, *width, *height)?))
            }
            StreamDescriptor::Audio { .. } => {
                if data.len() % 4 != 0 {
                    return Err(ExchangeError::BadFrame(format!(
                        "audio payload of {} bytes is not whole samples",
                        data.len()
                    )));
                }
                let samples = data
                    .chunks_exact(4)
                    .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                Ok(MediaFrame::Audio(samples))
            }
        }
    }

    fn descriptor(&self, stream_id: usize) -> Result<&StreamDescriptor> {
        self.streams.get(stream_id).ok_or_else(|| {
            ExchangeError::BadFrame(format!("frame for undeclared stream {stream_id}"))
        })
    }
}
