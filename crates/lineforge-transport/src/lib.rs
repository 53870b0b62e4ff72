//! Transport layer for Lineforge.
//!
//! Provides the TCP listener ([`TcpTransport`]) and the per-connection
//! [`ConnectionHandle`] that carries a byte stream together with the
//! limits the session must obey.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)   ← accepts, registers, spawns sessions
//!     ↕
//! Session          ← read/transform/write loop over a handle
//!     ↕
//! Transport (this crate) ← sockets, deadlines, close
//! ```

mod error;
mod handle;
mod listener;

pub use error::TransportError;
pub use handle::{ConnectionHandle, TRANSPORT_DEADLINE_FACTOR};
pub use listener::TcpTransport;

use std::fmt;

/// Opaque identifier for a connection.
///
/// Identities are process-unique; the registry keys live connections by
/// this value rather than by peer address, since a peer may reconnect
/// from the same address while its previous session is still draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
        assert_eq!(id.into_inner(), 7);
    }

    #[test]
    fn test_connection_id_hash_works_as_set_member() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        assert!(set.insert(ConnectionId::new(1)));
        assert!(set.insert(ConnectionId::new(2)));
        assert!(!set.insert(ConnectionId::new(1)));
        assert_eq!(set.len(), 2);
    }
}
