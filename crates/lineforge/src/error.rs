//! Unified error type for Lineforge.

use lineforge_protocol::ProtocolError;
use lineforge_session::SessionError;
use lineforge_transport::TransportError;

/// A [`ServerConfig`](crate::ServerConfig) value that cannot be served.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bind address must not be empty")]
    EmptyBindAddr,

    #[error("idle timeout must be greater than zero")]
    ZeroIdleTimeout,

    #[error("max line length must be greater than zero")]
    ZeroMaxLineLength,

    #[error("drain poll interval must be greater than zero")]
    ZeroDrainPollInterval,
}

/// Top-level error that wraps all crate-specific errors.
///
/// Only configuration and bind failures ever reach a caller of
/// [`Server::start`](crate::Server::start); per-connection failures are
/// logged and contained inside their session. The other variants exist
/// so embedding code can funnel everything through one type with `?`.
#[derive(Debug, thiserror::Error)]
pub enum LineforgeError {
    /// The server configuration was rejected before binding.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A transport-level error (bind, accept, local address).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A framing error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session ended abnormally.
    #[error(transparent)]
    Session(#[from] SessionError),
}
