//! Configuration for the PiKV server and client
//!
//! Typed settings with defaults matching the reference deployment.

use std::path::PathBuf;
use std::time::Duration;

/// Well-known TCP port of the server.
pub const DEFAULT_PORT: u16 = 31415;

/// Interval between two statistics reports.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Snapshot file loaded at startup and written at shutdown.
pub const DEFAULT_STORAGE_PATH: &str = "./pikv.snapshot";

/// How the acceptor hands out connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptMode {
    /// One live session at a time; the next accept is posted only after the
    /// current session ends. A fatal session error stops the acceptor.
    #[default]
    Serial,
    /// Every accepted connection is served by its own task.
    Concurrent,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub storage_path: PathBuf,
    pub stats_interval: Duration,
    pub accept_mode: AcceptMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            stats_interval: DEFAULT_STATS_INTERVAL,
            accept_mode: AcceptMode::Serial,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for [`ServerConfig`]
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address (host:port)
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// Set the snapshot file path
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Set the statistics reporting interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval = interval;
        self
    }

    pub fn accept_mode(mut self, mode: AcceptMode) -> Self {
        self.config.accept_mode = mode;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Connection retry policy of the client.
///
/// A failed attempt is retried after `backoff` until more than `budget` has
/// elapsed since the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            budget: Duration::from_secs(30),
        }
    }
}
