//! Server configuration.

use std::time::Duration;

use lineforge_protocol::DEFAULT_MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Address used when none is configured.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Idle timeout used when none is configured.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How often shutdown re-checks the live connection count.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for a [`Server`](crate::Server).
///
/// Immutable once the server has started. Durations are (de)serialized as
/// integer milliseconds, so a JSON config looks like:
///
/// ```json
/// {
///   "bind_addr": "0.0.0.0:7000",
///   "idle_timeout_ms": 30000,
///   "max_line_length": 4096,
///   "shutdown_timeout_ms": 5000
/// }
/// ```
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to listen on. Port 0 asks the OS for a free port.
    pub bind_addr: String,

    /// How long a connection may go without a complete line.
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,

    /// Longest accepted line, in bytes, excluding the terminator.
    pub max_line_length: usize,

    /// Interval between registry polls while draining.
    #[serde(rename = "drain_poll_interval_ms", with = "millis")]
    pub drain_poll_interval: Duration,

    /// Upper bound on how long shutdown waits before force-closing the
    /// connections that remain. `None` waits indefinitely.
    #[serde(rename = "shutdown_timeout_ms", with = "opt_millis")]
    pub shutdown_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            shutdown_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::EmptyBindAddr);
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::ZeroMaxLineLength);
        }
        if self.drain_poll_interval.is_zero() {
            return Err(ConfigError::ZeroDrainPollInterval);
        }
        Ok(())
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::duration_millis;

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::duration_millis;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&duration_millis(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
