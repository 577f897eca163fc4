use nutpipe_codec::CodecError;
use nutpipe_transport::TransportError;

/// Errors raised while running a frame exchange session.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("container error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame payload does not match the declared stream parameters.
    #[error("bad frame: {0}")]
    BadFrame(String),

    /// The peer declared a stream this implementation cannot decode.
    #[error("unsupported stream: {0}")]
    UnsupportedStream(String),

    /// The session was cancelled before or during the exchange.
    #[error("exchange cancelled")]
    Cancelled,

    /// The worker thread panicked; the session result is lost.
    #[error("exchange worker panicked")]
    WorkerPanic,
}

impl ExchangeError {
    /// True for the errors produced by deliberate cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ExchangeError::Cancelled => true,
            ExchangeError::Transport(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
