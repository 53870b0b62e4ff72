//! Uppercasing line server.
//!
//! Configuration is resolved in three layers, later ones winning:
//!
//! 1. built-in defaults (`127.0.0.1:8080`, 10s idle, 1000-byte lines)
//! 2. a JSON file named by `LINEFORGE_CONFIG`
//! 3. individual env vars: `LINEFORGE_ADDR`, `LINEFORGE_IDLE_TIMEOUT_MS`,
//!    `LINEFORGE_MAX_LINE`, `LINEFORGE_SHUTDOWN_TIMEOUT_MS`
//!
//! Log verbosity follows `RUST_LOG` (default `info`). Ctrl-C starts a
//! graceful shutdown.

use std::time::Duration;

use lineforge::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("cannot read config file {path}: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ParseConfig {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{var} must be an unsigned integer, got {value:?}")]
    BadEnv { var: &'static str, value: String },

    #[error(transparent)]
    Server(#[from] LineforgeError),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = load_config()?;
    tracing::info!(?config, "configuration loaded");

    let server = Server::start(config).await?;
    tracing::info!(addr = %server.local_addr(), "ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c, shutting down");
    }
    tracing::info!("shutdown signal received");
    server.shutdown().await;
    Ok(())
}

fn load_config() -> Result<ServerConfig, AppError> {
    let mut config = match std::env::var("LINEFORGE_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).map_err(|source| {
                AppError::ReadConfig {
                    path: path.clone(),
                    source,
                }
            })?;
            serde_json::from_str(&raw)
                .map_err(|source| AppError::ParseConfig { path, source })?
        }
        Err(_) => ServerConfig::default(),
    };

    if let Ok(addr) = std::env::var("LINEFORGE_ADDR") {
        config.bind_addr = addr;
    }
    if let Some(ms) = env_u64("LINEFORGE_IDLE_TIMEOUT_MS")? {
        config.idle_timeout = Duration::from_millis(ms);
    }
    if let Some(bytes) = env_u64("LINEFORGE_MAX_LINE")? {
        config.max_line_length =
            usize::try_from(bytes).map_err(|_| AppError::BadEnv {
                var: "LINEFORGE_MAX_LINE",
                value: bytes.to_string(),
            })?;
    }
    if let Some(ms) = env_u64("LINEFORGE_SHUTDOWN_TIMEOUT_MS")? {
        config.shutdown_timeout = Some(Duration::from_millis(ms));
    }

    Ok(config)
}

fn env_u64(var: &'static str) -> Result<Option<u64>, AppError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadEnv { var, value }),
        Err(_) => Ok(None),
    }
}
