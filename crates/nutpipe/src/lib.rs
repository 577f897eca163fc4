//! Stream raw audio/video frames to and from an external transcoder.
//!
//! nutpipe speaks a subset of the NUT multimedia container over a one-shot
//! loopback TCP connection, so a transcoding engine such as ffmpeg can be
//! handed a `tcp://` URL instead of a temporary file.
//!
//! # Crate Structure
//!
//! - [`transport`] — Ephemeral-port negotiation and cancellation
//! - [`codec`] — The container reader, writer and wire primitives
//! - [`exchange`] — Producer/consumer sessions with frame reordering

/// Re-export transport types.
pub mod transport {
    pub use nutpipe_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use nutpipe_codec::*;
}

/// Re-export exchange types.
pub mod exchange {
    pub use nutpipe_exchange::*;
}
