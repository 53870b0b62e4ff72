//! Connection handle: one accepted stream plus the limits it must obey.
//!
//! The handle is the only thing a session touches. It implements
//! [`AsyncRead`] and [`AsyncWrite`] by delegating to the inner stream,
//! with one addition: a transport-level deadline. Every read, write and
//! flush first checks the deadline, and once it has passed all I/O fails
//! with [`io::ErrorKind::TimedOut`]. The session's own idle timer is the
//! primary timeout; the deadline is a backstop for stalls the timer
//! cannot see (a peer that stops reading while we are mid-write).

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};

use crate::ConnectionId;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How many idle periods past the last refresh the transport deadline
/// sits. Must stay above 1 so the session timer always fires first.
pub const TRANSPORT_DEADLINE_FACTOR: u32 = 2;

/// An accepted connection bound to its per-connection limits.
///
/// Generic over the stream so sessions can be driven by in-memory
/// duplex pipes in tests; the server always uses [`TcpStream`].
pub struct ConnectionHandle<S = TcpStream> {
    id: ConnectionId,
    peer: SocketAddr,
    stream: Option<S>,
    idle_timeout: Duration,
    max_line_length: usize,
    deadline: Pin<Box<Sleep>>,
}

impl<S> ConnectionHandle<S> {
    /// Wraps `stream` and arms the transport deadline from now.
    ///
    /// Must be called from within a Tokio runtime (the deadline is a
    /// runtime timer).
    pub fn new(
        stream: S,
        peer: SocketAddr,
        idle_timeout: Duration,
        max_line_length: usize,
    ) -> Self {
        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        Self {
            id,
            peer,
            stream: Some(stream),
            idle_timeout,
            max_line_length,
            deadline: Box::pin(tokio::time::sleep(backstop(idle_timeout))),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, for logging.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Returns the instant after which all I/O on this handle fails.
    pub fn deadline(&self) -> Instant {
        self.deadline.deadline()
    }

    /// Moves the transport deadline to an absolute instant.
    pub fn set_deadline(&mut self, at: Instant) {
        self.deadline.as_mut().reset(at);
    }

    /// Pushes the transport deadline out to
    /// `now + idle_timeout * TRANSPORT_DEADLINE_FACTOR`.
    ///
    /// Called by the session after every completed line.
    pub fn refresh_deadline(&mut self) {
        let at = Instant::now() + backstop(self.idle_timeout);
        self.set_deadline(at);
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Releases the underlying stream.
    ///
    /// Idempotent: returns `true` only for the call that actually closed
    /// the stream. Any later I/O on the handle fails with
    /// [`io::ErrorKind::NotConnected`].
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                tracing::trace!(
                    conn_id = %self.id,
                    peer = %self.peer,
                    "stream released"
                );
                true
            }
            None => false,
        }
    }

    /// Returns `Some(err)` if the deadline has passed. Registers the
    /// waker with the deadline timer otherwise.
    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> Option<io::Error> {
        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Some(io::Error::new(
                io::ErrorKind::TimedOut,
                "transport deadline exceeded",
            )),
            Poll::Pending => None,
        }
    }
}

fn backstop(idle_timeout: Duration) -> Duration {
    idle_timeout.saturating_mul(TRANSPORT_DEADLINE_FACTOR)
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection handle closed")
}

impl<S> fmt::Debug for ConnectionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .field("idle_timeout", &self.idle_timeout)
            .field("max_line_length", &self.max_line_length)
            .finish()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ConnectionHandle<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ConnectionHandle<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        match this.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
