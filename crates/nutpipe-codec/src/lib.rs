//! Container codec for raw frame streams.
//!
//! Implements the subset of the NUT container used to exchange uncompressed
//! audio and video frames with an external transcoder: a main header with a
//! 256-entry frame-code table, per-stream headers, and delta-coded frames
//! with optional side and meta data.

pub mod crc;
pub mod error;
pub mod flags;
pub mod model;
pub mod packet;
pub mod reader;
pub mod table;
pub mod varint;
pub mod writer;

pub use error::{CodecError, Result};
pub use model::{
    AudioParams, DataItem, DataValue, Frame, MainHeader, Rational, StreamHeader, StreamKind,
    Timestamp, VideoParams,
};
pub use reader::NutReader;
pub use table::FrameCodeTable;
pub use writer::{NutWriter, DEFAULT_MAX_DISTANCE};
