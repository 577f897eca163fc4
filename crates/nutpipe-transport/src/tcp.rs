use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// One-shot TCP negotiation endpoint.
///
/// Binds a loopback listener on an ephemeral port and waits for exactly one
/// peer connection. The `host:port` string is exposed so the caller can embed
/// it into the peer process's invocation (e.g. an ffmpeg `tcp://` URL). Once
/// the peer connects, the accepted stream is handed over and the listener is
/// closed; no further connections are possible or expected.
///
/// Lifecycle: bound on construction, listening until [`negotiate`] accepts or
/// a [`CancelHandle`] unblocks it, closed when `negotiate` returns.
///
/// [`negotiate`]: TcpNegotiator::negotiate
pub struct TcpNegotiator {
    listener: TcpListener,
    addr: SocketAddr,
    cancelled: Arc<AtomicBool>,
    accepted: Arc<Mutex<Option<TcpStream>>>,
}

/// Cancels a negotiation session from another thread.
///
/// Before the peer connects this unblocks the pending
/// [`TcpNegotiator::negotiate`]; afterwards it shuts the accepted stream
/// down, so reads and writes blocked on a stalled peer return with an I/O
/// error.
#[derive(Clone)]
pub struct CancelHandle {
    addr: SocketAddr,
    cancelled: Arc<AtomicBool>,
    accepted: Arc<Mutex<Option<TcpStream>>>,
}

fn lock_accepted(slot: &Mutex<Option<TcpStream>>) -> MutexGuard<'_, Option<TcpStream>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TcpNegotiator {
    /// Bind a loopback listener on an ephemeral port.
    pub fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|e| TransportError::Bind {
            addr: "127.0.0.1:0".to_string(),
            source: e,
        })?;
        let addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: "127.0.0.1:0".to_string(),
            source: e,
        })?;

        info!(%addr, "listening for frame exchange peer");

        Ok(Self {
            listener,
            addr,
            cancelled: Arc::new(AtomicBool::new(false)),
            accepted: Arc::new(Mutex::new(None)),
        })
    }

    /// The `host:port` string to hand to the peer process.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.addr.ip(), self.addr.port())
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// A handle that can unblock a pending `negotiate` from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            addr: self.addr,
            cancelled: Arc::clone(&self.cancelled),
            accepted: Arc::clone(&self.accepted),
        }
    }

    /// Block until the peer connects, then hand over the stream.
    ///
    /// Consumes the negotiator: the listener is dropped (closed) as soon as
    /// one connection is accepted, so the handoff happens exactly once. If
    /// the peer never connects this blocks until a [`CancelHandle`] fires,
    /// which surfaces as [`TransportError::Cancelled`].
    pub fn negotiate(self) -> Result<TcpStream> {
        let (stream, peer_addr) = self.listener.accept().map_err(|e| {
            if self.cancelled.load(Ordering::SeqCst) {
                TransportError::Cancelled
            } else {
                TransportError::Accept(e)
            }
        })?;

        // Publish the stream before re-checking the flag: a cancellation
        // landing from here on finds the socket and shuts it down instead of
        // poking the already-closed listener.
        *lock_accepted(&self.accepted) = Some(stream.try_clone()?);

        if self.cancelled.load(Ordering::SeqCst) {
            debug!(%peer_addr, "accept unblocked by cancellation; dropping connection");
            return Err(TransportError::Cancelled);
        }

        stream.set_nodelay(true)?;
        debug!(%peer_addr, "peer connected; closing listener");
        // `self.listener` is dropped here, closing the server socket.
        Ok(stream)
    }
}

impl CancelHandle {
    /// Cancel the session.
    ///
    /// Sets the cancellation flag, then either shuts down the accepted
    /// stream (peer already connected) or pokes the listener with a
    /// throwaway connection so a blocked `accept()` wakes up and observes
    /// the flag.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(addr = %self.addr, "cancelling session");
        if let Some(stream) = lock_accepted(&self.accepted).take() {
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        // Connect failure is fine: it means accept already returned and the
        // listener is gone.
        let _ = TcpStream::connect(self.addr);
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn negotiate_hands_over_single_connection() {
        let negotiator = TcpNegotiator::bind().unwrap();
        let addr = negotiator.local_addr();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut stream = negotiator.negotiate().unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        client.join().unwrap();
    }

    #[test]
    fn endpoint_is_parseable_loopback() {
        let negotiator = TcpNegotiator::bind().unwrap();
        let endpoint = negotiator.endpoint();
        let parsed: SocketAddr = endpoint.parse().unwrap();
        assert!(parsed.ip().is_loopback());
        assert_ne!(parsed.port(), 0);
    }

    #[test]
    fn cancel_unblocks_pending_accept() {
        let negotiator = TcpNegotiator::bind().unwrap();
        let handle = negotiator.cancel_handle();

        let waiter = thread::spawn(move || negotiator.negotiate());

        thread::sleep(Duration::from_millis(50));
        handle.cancel();

        let err = waiter.join().unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancel_shuts_down_the_accepted_stream() {
        let negotiator = TcpNegotiator::bind().unwrap();
        let handle = negotiator.cancel_handle();
        let addr = negotiator.local_addr();

        // Peer connects and then goes silent.
        let peer = thread::spawn(move || {
            let stream = TcpStream::connect(addr).unwrap();
            thread::sleep(Duration::from_millis(200));
            drop(stream);
        });

        let mut stream = negotiator.negotiate().unwrap();
        let reader = thread::spawn(move || {
            let mut buf = [0u8; 1];
            stream.read(&mut buf)
        });

        thread::sleep(Duration::from_millis(50));
        handle.cancel();

        // The blocked read returns EOF or an error instead of hanging on
        // the silent peer.
        let outcome = reader.join().unwrap();
        assert!(!matches!(outcome, Ok(n) if n > 0));
        peer.join().unwrap();
    }

    #[test]
    fn cancel_is_idempotent() {
        let negotiator = TcpNegotiator::bind().unwrap();
        let handle = negotiator.cancel_handle();
        let waiter = thread::spawn(move || negotiator.negotiate());

        handle.cancel();
        handle.cancel();

        assert!(waiter.join().unwrap().is_err());
    }

    #[test]
    fn listener_closed_after_negotiation() {
        let negotiator = TcpNegotiator::bind().unwrap();
        let addr = negotiator.local_addr();

        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let stream = negotiator.negotiate().unwrap();
        let _peer = client.join().unwrap();
        drop(stream);

        // The server socket is gone; a fresh connect must fail. Retry a few
        // times to ride out the kernel draining the backlog.
        let mut refused = false;
        for _ in 0..20 {
            match TcpStream::connect(addr) {
                Ok(_) => thread::sleep(Duration::from_millis(10)),
                Err(_) => {
                    refused = true;
                    break;
                }
            }
        }
        assert!(refused, "listener should be closed after handoff");
    }
}
