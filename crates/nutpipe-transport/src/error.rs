/// Errors that can occur during socket negotiation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the negotiation listener.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept the peer connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the negotiated stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The negotiation was cancelled before the peer connected.
    ///
    /// Raised when `cancel()` unblocks a pending accept. Callers tearing a
    /// session down should treat this as expected, not as a transport failure.
    #[error("negotiation cancelled")]
    Cancelled,
}

impl TransportError {
    /// True if this error was caused by an external `cancel()`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
