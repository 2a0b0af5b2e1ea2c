//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tclink_protocol::DEFAULT_MAX_DEPTH;

use crate::SessionError;

/// Configuration for a [`Session`](crate::Session).
///
/// Every field has a default, so configs can be loaded from partial
/// documents:
///
/// ```rust
/// use tclink_session::SessionConfig;
///
/// let config: SessionConfig =
///     serde_json::from_str(r#"{ "opposite": "slave", "reply_timeout_ms": 250 }"#).unwrap();
/// assert_eq!(config.opposite.as_deref(), Some("slave"));
/// assert_eq!(config.discovery_workers, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the peer to connect to. When set, broadcasts and inbound
    /// connections from any other peer are ignored.
    pub opposite: Option<String>,

    /// Concurrent discovery (broadcast receive) loops.
    pub discovery_workers: usize,

    /// Concurrent connection accept loops.
    pub connection_workers: usize,

    /// Default bound for [`Session::connect`](crate::Session::connect).
    pub connect_timeout_ms: u64,

    /// First delay between discovery attempts while connecting.
    pub initial_backoff_ms: u64,

    /// Ceiling for the doubling discovery delay.
    pub max_backoff_ms: u64,

    /// How long `send` waits for the opposite peer's reply.
    pub reply_timeout_ms: u64,

    /// Maximum nesting of combined packets accepted and produced.
    pub max_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            opposite: None,
            discovery_workers: 1,
            connection_workers: 1,
            connect_timeout_ms: 5_000,
            initial_backoff_ms: 20,
            max_backoff_ms: 500,
            reply_timeout_ms: 5_000,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SessionConfig {
    /// Returns the config with `opposite` set.
    #[must_use]
    pub fn with_opposite(mut self, opposite: impl Into<String>) -> Self {
        self.opposite = Some(opposite.into());
        self
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    /// [`SessionError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |field: &str| {
            Err(SessionError::InvalidConfig(format!("{field} must be greater than zero")))
        };
        if self.discovery_workers == 0 {
            return invalid("discovery_workers");
        }
        if self.connection_workers == 0 {
            return invalid("connection_workers");
        }
        if self.connect_timeout_ms == 0 {
            return invalid("connect_timeout_ms");
        }
        if self.initial_backoff_ms == 0 {
            return invalid("initial_backoff_ms");
        }
        if self.reply_timeout_ms == 0 {
            return invalid("reply_timeout_ms");
        }
        if self.max_depth == 0 {
            return invalid("max_depth");
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(SessionError::InvalidConfig(
                "max_backoff_ms must not be below initial_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    /// Threads in the session's worker pool.
    pub fn worker_threads(&self) -> usize {
        self.discovery_workers + self.connection_workers
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}
