//! Socket negotiation for in-memory frame exchange.
//!
//! A negotiation is a one-shot handoff: bind a loopback TCP listener on an
//! ephemeral port, publish `host:port` to the peer process, block until it
//! connects, then hand the single accepted stream to the container
//! reader/writer and close the listener.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{CancelHandle, TcpNegotiator};
