//! The seam between application code and an exchange session.

use image::RgbaImage;
use nutpipe_codec::Rational;

use crate::error::Result;

/// Shape of one stream in an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDescriptor {
    Video {
        width: u32,
        height: u32,
        /// Frames per second; the pts unit is one frame.
        frame_rate: Rational,
    },
    Audio {
        /// Samples per second; the pts unit is one sample.
        sample_rate: u32,
        channels: u32,
    },
}

/// One decoded or to-be-encoded media frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaFrame {
    Video(RgbaImage),
    /// Interleaved signed 32-bit samples.
    Audio(Vec<i32>),
}

/// Source of frames for an outbound exchange.
///
/// `next_frame` returns the stream id, the pts in the stream's own unit
/// (frame index for video, sample offset for audio) and the frame itself;
/// `None` ends the session cleanly.
pub trait FrameProducer: Send {
    fn streams(&self) -> Vec<StreamDescriptor>;
    fn next_frame(&mut self) -> Result<Option<(usize, i64, MediaFrame)>>;
}

/// Sink for frames of an inbound exchange.
///
/// `configure` runs once after the peer's headers are parsed; frames then
/// arrive in presentation order within the reorder window, with their pts
/// converted to milliseconds.
pub trait FrameConsumer: Send {
    fn configure(&mut self, streams: &[StreamDescriptor]) -> Result<()>;
    fn consume(&mut self, stream_id: usize, pts_ms: i64, frame: MediaFrame) -> Result<()>;

    /// Called once after the last frame, when the peer's stream has ended.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
