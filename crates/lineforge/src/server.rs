//! `Server` builder, accept loop and graceful shutdown.
//!
//! This ties the layers together: transport → session, with the
//! [`ConnectionRegistry`] as the only shared state.
//!
//! ## Lifecycle
//!
//! ```text
//! start() ──→ accept loop ──→ connection task ──→ guard drop
//!   │            │  (registry insert)  (session.run)  (close + remove)
//!   │            ▼
//!   │      shutdown(): flag → stop accept loop → listener closed
//!   │                    → poll registry.count() until 0
//!   ▼                    → (optional) force-close after shutdown_timeout
//! Server
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lineforge_protocol::{LineTransform, Uppercase};
use lineforge_session::{LineSession, SessionError};
use lineforge_transport::{ConnectionHandle, TcpTransport};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::duration_millis;
use crate::{ConnectionRegistry, LineforgeError, ServerConfig};

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// State shared by the accept loop and every connection task.
struct ServerContext {
    config: ServerConfig,
    transform: Arc<dyn LineTransform>,
    registry: Arc<ConnectionRegistry>,
}

/// Builder for configuring and starting a [`Server`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), lineforge::LineforgeError> {
/// use std::time::Duration;
/// use lineforge::Server;
///
/// let server = Server::builder()
///     .bind("0.0.0.0:7000")
///     .idle_timeout(Duration::from_secs(30))
///     .transform(|line: &str| line.to_lowercase())
///     .start()
///     .await?;
///
/// // ... later
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    transform: Arc<dyn LineTransform>,
}

impl ServerBuilder {
    /// Creates a builder with default settings and the [`Uppercase`]
    /// transform.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            transform: Arc::new(Uppercase),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.config.max_line_length = bytes;
        self
    }

    pub fn drain_poll_interval(mut self, interval: Duration) -> Self {
        self.config.drain_poll_interval = interval;
        self
    }

    /// Bounds how long [`Server::shutdown`] waits before force-closing
    /// the remaining connections.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = Some(timeout);
        self
    }

    /// Sets the function applied to every line.
    pub fn transform(mut self, transform: impl LineTransform) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    /// Validates the configuration, binds the listener and starts the
    /// accept loop on its own task. Returns as soon as the listener is
    /// bound.
    ///
    /// # Errors
    /// [`LineforgeError::Config`] for an unusable configuration and
    /// [`LineforgeError::Transport`] if the address cannot be bound.
    pub async fn start(self) -> Result<Server, LineforgeError> {
        self.config.validate()?;

        let transport = TcpTransport::bind(&self.config.bind_addr).await?;
        let local_addr = transport.local_addr()?;

        let ctx = Arc::new(ServerContext {
            config: self.config,
            transform: self.transform,
            registry: Arc::new(ConnectionRegistry::new()),
        });

        let stop_accepting = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            transport,
            Arc::clone(&ctx),
            stop_accepting.clone(),
        ));

        tracing::info!(%local_addr, "Lineforge server running");

        Ok(Server {
            ctx,
            local_addr,
            stop_accepting,
            accept_task: Some(accept_task),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Lineforge server.
///
/// Dropping a `Server` without calling [`shutdown`](Self::shutdown)
/// stops the accept loop but leaves running sessions to finish on their
/// own.
pub struct Server {
    ctx: Arc<ServerContext>,
    local_addr: SocketAddr,
    stop_accepting: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Starts a server with `config` and the default transform.
    pub async fn start(config: ServerConfig) -> Result<Self, LineforgeError> {
        ServerBuilder::new().config(config).start().await
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    /// Number of sessions currently running.
    pub fn active_connections(&self) -> usize {
        self.ctx.registry.count()
    }

    /// Stops accepting and waits for every live connection to close.
    ///
    /// Closing the listener is what actually stops new connections; once
    /// the accept loop has exited, connection attempts are refused. The
    /// registry's shutdown flag additionally drops any socket accepted
    /// in the narrow window before that.
    ///
    /// Running sessions are not interrupted. They end by idling out or
    /// by their peers disconnecting, and this call polls the registry
    /// every `drain_poll_interval` until it is empty. If a
    /// `shutdown_timeout` is configured and elapses first, the remaining
    /// sessions are cancelled and the drain continues until their guards
    /// have deregistered them.
    pub async fn shutdown(mut self) {
        self.ctx.registry.begin_shutdown();
        tracing::info!(active = self.ctx.registry.count(), "shutting down...");

        self.stop_accepting.cancel();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::error!(
                    error = %e,
                    "accept loop terminated abnormally"
                );
            }
        }

        let started = Instant::now();
        let config = &self.ctx.config;

        let force_close = async {
            match config.shutdown_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(force_close);
        let mut forced = false;

        let mut ticker = tokio::time::interval(config.drain_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the loop
        // below waits a full interval between polls.
        ticker.tick().await;

        loop {
            let remaining = self.ctx.registry.count();
            if remaining == 0 {
                break;
            }

            tokio::select! {
                () = &mut force_close, if !forced => {
                    forced = true;
                    let cancelled = self.ctx.registry.cancel_all();
                    tracing::warn!(
                        cancelled,
                        "shutdown timeout elapsed, force-closing connections"
                    );
                }
                _ = ticker.tick() => {
                    tracing::info!(
                        remaining = self.ctx.registry.count(),
                        "waiting on connections"
                    );
                }
            }
        }

        tracing::info!(
            elapsed_ms = duration_millis(started.elapsed()),
            forced,
            "shutdown complete"
        );
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop_accepting.cancel();
    }
}

/// Accepts connections until `stop` is cancelled, then drops (closes)
/// the listener.
async fn accept_loop(
    transport: TcpTransport,
    ctx: Arc<ServerContext>,
    stop: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;

            () = stop.cancelled() => break,
            res = transport.accept() => res,
        };

        match accepted {
            Ok((stream, peer)) => admit(stream, peer, &ctx),
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                if !backoff_after_accept_error(&stop).await {
                    break;
                }
            }
        }
    }

    drop(transport);
    tracing::info!("listener closed");
}

/// Waits out [`ACCEPT_ERROR_BACKOFF`] so a persistent accept failure
/// (fd exhaustion) does not spin. Returns `false` if `stop` fired first.
async fn backoff_after_accept_error(stop: &CancellationToken) -> bool {
    tokio::select! {
        () = stop.cancelled() => false,
        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

/// Registers one accepted socket and spawns its session.
fn admit(stream: TcpStream, peer: SocketAddr, ctx: &Arc<ServerContext>) {
    // The handle arms its transport deadline on construction.
    let handle = ConnectionHandle::new(
        stream,
        peer,
        ctx.config.idle_timeout,
        ctx.config.max_line_length,
    );
    let conn_id = handle.id();

    let cancel = match ctx.registry.insert(conn_id) {
        Ok(token) => token,
        Err(e) => {
            // `handle` drops here, closing the socket unserved.
            tracing::debug!(
                %conn_id,
                %peer,
                error = %e,
                "connection refused"
            );
            return;
        }
    };

    tracing::info!(
        %conn_id,
        %peer,
        active = ctx.registry.count(),
        "accepted connection"
    );

    let guard = ConnectionGuard {
        handle,
        registry: Arc::clone(&ctx.registry),
    };
    let session = LineSession::new(Arc::clone(&ctx.transform))
        .with_cancellation(cancel);
    tokio::spawn(handle_connection(guard, session));
}

/// Drop guard that closes the connection and deregisters it.
///
/// Runs exactly once however the connection task ends: normal return,
/// error, panic, or the task being dropped by a shutting-down runtime.
/// Close happens before removal, so a registry count of zero means every
/// socket is already closed.
struct ConnectionGuard {
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conn_id = self.handle.id();
        self.handle.close();
        self.registry.remove(conn_id);
        tracing::info!(
            %conn_id,
            peer = %self.handle.peer_addr(),
            active = self.registry.count(),
            "closed connection"
        );
    }
}

/// Handles a single connection from accept to close.
async fn handle_connection(
    mut guard: ConnectionGuard,
    mut session: LineSession,
) {
    let conn_id = guard.handle.id();

    match session.run(&mut guard.handle).await {
        Ok(outcome) => {
            tracing::info!(
                %conn_id,
                %outcome,
                lines = session.lines_echoed(),
                "session ended"
            );
        }
        Err(e @ SessionError::LineTooLong { .. }) => {
            tracing::warn!(
                %conn_id,
                error = %e,
                lines = session.lines_echoed(),
                "protocol violation, closing"
            );
        }
        Err(e) => {
            tracing::debug!(
                %conn_id,
                error = %e,
                lines = session.lines_echoed(),
                "connection ended with error"
            );
        }
    }

    // `guard` drops here → close + deregister.
}
