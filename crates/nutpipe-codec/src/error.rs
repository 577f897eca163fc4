/// Errors that can occur while encoding or decoding the container stream.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The stream does not begin with the container file magic.
    #[error("bad file magic (expected \"nut/multimedia container\")")]
    BadMagic,

    /// The stream violates the container structure.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// A packet checksum did not match its payload.
    #[error("checksum mismatch (expected {expected:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// Declared stream ids are not 0-based and contiguous.
    ///
    /// This is a programmer error in the producer, not a recoverable
    /// condition.
    #[error("invalid stream declaration: {0}")]
    InvalidStreamDeclaration(String),

    /// A variable-length integer exceeds the 63 usable bits of the format.
    #[error("varint overflows 63 bits")]
    VarintOverflow,

    /// A length field exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame was written after the session was finished.
    #[error("container writer already finished")]
    Finished,

    /// An I/O error occurred while reading or writing the stream.
    #[error("container I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
