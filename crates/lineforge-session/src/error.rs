//! Error types for the session layer.

use lineforge_protocol::ProtocolError;

/// Ways a session can end abnormally.
///
/// None of these are fatal to the server: the owner logs them, closes the
/// connection and moves on. Idle timeout, peer close and cancellation are
/// *not* errors; see [`SessionOutcome`](crate::SessionOutcome).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer sent more than `max` bytes without a line terminator.
    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },

    /// Reading from the connection failed.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Writing or flushing a reply failed.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// The handle was configured with a zero idle timeout, which would
    /// close every connection before it could send anything.
    #[error("idle timeout must be greater than zero")]
    ZeroIdleTimeout,
}

impl SessionError {
    pub(crate) fn from_read(err: ProtocolError) -> Self {
        match err {
            ProtocolError::LineTooLong { max } => Self::LineTooLong { max },
            ProtocolError::Io(e) => Self::Read(e),
        }
    }

    pub(crate) fn from_write(err: ProtocolError) -> Self {
        match err {
            ProtocolError::LineTooLong { max } => Self::LineTooLong { max },
            ProtocolError::Io(e) => Self::Write(e),
        }
    }
}
