//! Error types for the protocol layer.

/// Errors that can occur while framing lines.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// More than `max` bytes arrived without a line terminator.
    ///
    /// The codec refuses to buffer further, so the session must end.
    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },

    /// The underlying stream failed while a frame was being read or
    /// written. `tokio_util`'s framing requires this conversion.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
