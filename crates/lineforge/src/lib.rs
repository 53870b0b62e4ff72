//! # Lineforge
//!
//! A concurrent, line-oriented TCP server.
//!
//! Every accepted connection gets its own task that reads
//! newline-delimited lines, passes each one through a [`LineTransform`]
//! (uppercasing by default) and writes the result back. A connection that
//! produces no complete line within the idle timeout is closed. Shutdown
//! stops accepting, then waits for the live connections to drain.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lineforge::prelude::*;
//!
//! # async fn demo() -> Result<(), LineforgeError> {
//! let server = Server::start(ServerConfig::default()).await?;
//! println!("listening on {}", server.local_addr());
//!
//! tokio::signal::ctrl_c().await.ok();
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `lineforge-transport`: listener, connection handles, deadlines
//! - `lineforge-protocol`: line framing and transforms
//! - `lineforge-session`: the per-connection read/transform/write loop
//! - `lineforge` (this crate): registry, accept loop, shutdown

mod config;
mod error;
mod registry;
mod server;

pub use config::{
    DEFAULT_BIND_ADDR, DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_IDLE_TIMEOUT,
    ServerConfig,
};
pub use error::{ConfigError, LineforgeError};
pub use registry::{AdmitError, ConnectionRegistry};
pub use server::{Server, ServerBuilder};

pub use lineforge_protocol::{LineTransform, Uppercase};
pub use lineforge_session::{SessionError, SessionOutcome};
pub use lineforge_transport::ConnectionId;

pub mod prelude {
    pub use crate::{
        LineTransform, LineforgeError, Server, ServerBuilder, ServerConfig,
        Uppercase,
    };
}
