//! Live-connection registry and shutdown gate.
//!
//! The registry is the only state shared across connection tasks. It
//! holds the set of live connection ids and the server's "shutting down"
//! flag behind a single mutex, so checking the flag and inserting an id
//! is one atomic step: once [`begin_shutdown`] returns, no later
//! [`insert`] can succeed.
//!
//! The lock is a `std::sync::Mutex`, held for O(1) work and never across
//! an `.await`. That also lets the connection guard deregister from
//! `Drop`, which is synchronous.
//!
//! [`begin_shutdown`]: ConnectionRegistry::begin_shutdown
//! [`insert`]: ConnectionRegistry::insert

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lineforge_transport::ConnectionId;
use tokio_util::sync::CancellationToken;

/// Why an [`insert`](ConnectionRegistry::insert) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    /// Shutdown has begun; no new sessions are admitted.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The id is already registered.
    #[error("{0} is already registered")]
    Duplicate(ConnectionId),
}

#[derive(Default)]
struct Inner {
    shutting_down: bool,
    /// Each live connection with the token that force-closes it.
    live: HashMap<ConnectionId, CancellationToken>,
}

/// Thread-safe set of live connections plus the shutdown flag.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a panic
        // elsewhere while holding the lock cannot corrupt it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection, unless shutdown has begun.
    ///
    /// Returns the token the connection's session must watch; cancelling
    /// it is how a bounded shutdown force-closes stragglers.
    pub fn insert(
        &self,
        id: ConnectionId,
    ) -> Result<CancellationToken, AdmitError> {
        let mut inner = self.lock();
        if inner.shutting_down {
            return Err(AdmitError::ShuttingDown);
        }
        if inner.live.contains_key(&id) {
            return Err(AdmitError::Duplicate(id));
        }
        let token = CancellationToken::new();
        inner.live.insert(id, token.clone());
        Ok(token)
    }

    /// Deregisters a connection. Idempotent; returns whether it was live.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().live.remove(&id).is_some()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().live.contains_key(&id)
    }

    /// Flips the shutdown flag. Returns `true` only for the call that
    /// actually flipped it.
    pub fn begin_shutdown(&self) -> bool {
        let mut inner = self.lock();
        let first = !inner.shutting_down;
        inner.shutting_down = true;
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Cancels every live connection's token and returns how many there
    /// were. Entries stay registered until their own guard removes them.
    pub fn cancel_all(&self) -> usize {
        let inner = self.lock();
        for token in inner.live.values() {
            token.cancel();
        }
        inner.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[test]
    fn test_insert_remove_count() {
        let reg = ConnectionRegistry::new();
        assert_eq!(reg.count(), 0);

        reg.insert(id(1)).unwrap();
        reg.insert(id(2)).unwrap();
        assert_eq!(reg.count(), 2);
        assert!(reg.contains(id(1)));

        assert!(reg.remove(id(1)));
        assert!(!reg.remove(id(1)), "second remove is a no-op");
        assert_eq!(reg.count(), 1);
        assert!(!reg.contains(id(1)));
    }

    #[test]
    fn test_duplicate_insert_is_refused() {
        let reg = ConnectionRegistry::new();
        reg.insert(id(7)).unwrap();
        let err = reg.insert(id(7)).unwrap_err();
        assert_eq!(err, AdmitError::Duplicate(id(7)));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_shutdown_closes_the_gate() {
        let reg = ConnectionRegistry::new();
        reg.insert(id(1)).unwrap();

        assert!(reg.begin_shutdown());
        assert!(!reg.begin_shutdown(), "flag flips exactly once");
        assert!(reg.is_shutting_down());

        assert_eq!(reg.insert(id(2)).unwrap_err(), AdmitError::ShuttingDown);
        // Existing entries are untouched and can still leave.
        assert_eq!(reg.count(), 1);
        assert!(reg.remove(id(1)));
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_cancel_all_cancels_live_tokens_only() {
        let reg = ConnectionRegistry::new();
        let a = reg.insert(id(1)).unwrap();
        let b = reg.insert(id(2)).unwrap();
        reg.remove(id(2));

        assert_eq!(reg.cancel_all(), 1);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert_eq!(reg.count(), 1, "cancel does not deregister");
    }

    #[test]
    fn test_concurrent_churn_keeps_count_exact() {
        let reg = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        let conn = id(t * 10_000 + i);
                        reg.insert(conn).unwrap();
                        if i % 2 == 0 {
                            assert!(reg.remove(conn));
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(reg.count(), 8 * 250);
    }
}
