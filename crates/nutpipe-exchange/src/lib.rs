//! Frame exchange sessions.
//!
//! Bridges in-process frame producers and consumers to an external
//! transcoder over a one-shot loopback TCP connection, using the container
//! codec for the wire format and a small reordering buffer to restore
//! presentation order on the way in.

pub mod adapter;
pub mod capability;
pub mod error;
pub mod image_format;
pub mod reorder;
pub mod session;

pub use adapter::{FrameAdapter, PCM_S32BE_FOURCC};
pub use capability::{FrameConsumer, FrameProducer, MediaFrame, StreamDescriptor};
pub use error::{ExchangeError, Result};
pub use image_format::{Abgr32, Bgr24, ImageFormat};
pub use reorder::{ReorderBuffer, DEFAULT_WINDOW_MS};
pub use session::{
    read_exchange, read_exchange_with_window, write_exchange, write_exchange_with_window,
    ExchangeSession,
};
