//! The read/transform/write loop.
//!
//! Each iteration races three things in a `biased` `tokio::select!`:
//!
//! 1. the next framed line,
//! 2. the owner's cancellation token,
//! 3. an idle timer armed at the start of the iteration.
//!
//! Exactly one wins and is acted upon. When several are ready at once,
//! the order above decides: a line that has already arrived is always
//! served before the session gives up on the connection.
//!
//! The framed read is cancel-safe, so the losing read future is simply
//! dropped. Partial input stays in the framed buffer for the next
//! iteration; there is never more than one read outstanding and no
//! helper task to clean up.

use std::fmt;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use lineforge_protocol::{LineCodec, LineTransform};
use lineforge_transport::ConnectionHandle;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::SessionError;

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No complete line arrived within the idle timeout.
    IdleTimeout,
    /// The peer closed its side of the connection.
    PeerClosed,
    /// The owner cancelled the session (forced close during shutdown).
    Cancelled,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What woke the session up this iteration.
enum Wake {
    Line(String),
    Eof,
    Cancelled,
    Idle,
}

/// Drives one connection until it terminates.
pub struct LineSession {
    transform: Arc<dyn LineTransform>,
    cancel: CancellationToken,
    lines_echoed: u64,
}

impl LineSession {
    /// Creates a session that applies `transform` to every line.
    pub fn new(transform: Arc<dyn LineTransform>) -> Self {
        Self {
            transform,
            cancel: CancellationToken::new(),
            lines_echoed: 0,
        }
    }

    /// Ties the session to an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of lines transformed and written back so far.
    pub fn lines_echoed(&self) -> u64 {
        self.lines_echoed
    }

    /// Runs the session to completion over `handle`.
    ///
    /// Lines are answered strictly in arrival order, one write and one
    /// flush per line. After each reply the idle timer starts over and
    /// the handle's transport deadline is pushed out.
    ///
    /// # Errors
    /// Returns [`SessionError`] on an oversized line, a read or write
    /// fault, or a zero idle timeout. The handle is left open either way.
    pub async fn run<S>(
        &mut self,
        handle: &mut ConnectionHandle<S>,
    ) -> Result<SessionOutcome, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let idle_timeout = handle.idle_timeout();
        if idle_timeout.is_zero() {
            return Err(SessionError::ZeroIdleTimeout);
        }
        let conn_id = handle.id();
        let codec = LineCodec::new(handle.max_line_length());
        let mut framed = Framed::new(handle, codec);

        loop {
            let idle = tokio::time::sleep(idle_timeout);

            let wake = tokio::select! {
                biased;

                frame = framed.next() => match frame {
                    Some(Ok(line)) => Wake::Line(line),
                    Some(Err(e)) => return Err(SessionError::from_read(e)),
                    None => Wake::Eof,
                },
                () = self.cancel.cancelled() => Wake::Cancelled,
                () = idle => Wake::Idle,
            };

            match wake {
                Wake::Line(line) => {
                    let reply = self.transform.transform(&line);
                    framed
                        .send(reply)
                        .await
                        .map_err(SessionError::from_write)?;
                    self.lines_echoed += 1;
                    framed.get_mut().refresh_deadline();
                    tracing::trace!(%conn_id, len = line.len(), "line echoed");
                }
                Wake::Eof => return Ok(SessionOutcome::PeerClosed),
                Wake::Cancelled => return Ok(SessionOutcome::Cancelled),
                Wake::Idle => return Ok(SessionOutcome::IdleTimeout),
            }
        }
    }
}
