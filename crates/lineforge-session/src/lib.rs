//! Line sessions for Lineforge.
//!
//! A [`LineSession`] drives one connection through the
//! read → transform → write cycle until it goes idle, the peer hangs up,
//! the owner cancels it, or something fails.
//!
//! ```text
//!            ┌────────────────┐  line: transform, write, flush
//!   start ──▶│ Awaiting-Line  │◀──────────────┐
//!            └───────┬────────┘───────────────┘
//!                    │ idle timeout / EOF / cancel / fault / oversized
//!                    ▼
//!              ┌────────────┐
//!              │ Terminated │
//!              └────────────┘
//! ```
//!
//! The session never closes its connection. Closing and deregistering
//! belong to whoever owns the handle, so that bookkeeping happens in one
//! place on every exit path.

mod error;
mod session;

pub use error::SessionError;
pub use session::{LineSession, SessionOutcome};
