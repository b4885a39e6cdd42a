//! Server configuration
//!
//! Every tunable lives in `ServerConfig`. Defaults match a local demo
//! deployment; `from_env` overrides individual fields from `COLLAB_*`
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Document served to the first client
const DEFAULT_DOCUMENT: &str = "// Welcome to the Collaborative Editor!\n\
// Start typing to see real-time collaboration in action.\n\
\n\
function hello() {\n    console.log('Hello, collaborative world!');\n}\n\
\n\
hello();";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Path accepting WebSocket upgrades
    pub ws_path: String,
    /// Path of the read-only document snapshot
    pub snapshot_path: String,
    /// Hub command channel capacity
    pub command_capacity: usize,
    /// Per-client outbound queue capacity
    pub outbound_capacity: usize,
    /// Largest accepted inbound frame/message, in bytes
    pub max_frame_size: usize,
    /// Connection is dropped if nothing is read for this long
    pub idle_timeout: Duration,
    /// Liveness ping period; must be shorter than `idle_timeout`
    pub ping_interval: Duration,
    /// Limit for a single outbound write
    pub write_timeout: Duration,
    /// Initial document content
    pub initial_document: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            ws_path: "/ws".to_string(),
            snapshot_path: "/document".to_string(),
            command_capacity: 256,
            outbound_capacity: 256,
            max_frame_size: 64 * 1024,
            idle_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            initial_document: DEFAULT_DOCUMENT.to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by any `COLLAB_*` variables that are set
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let config = Self {
            bind_addr: env_or("COLLAB_ADDR", defaults.bind_addr)?,
            ws_path: env_or("COLLAB_WS_PATH", defaults.ws_path)?,
            snapshot_path: env_or("COLLAB_SNAPSHOT_PATH", defaults.snapshot_path)?,
            command_capacity: env_or("COLLAB_COMMAND_CAPACITY", defaults.command_capacity)?,
            outbound_capacity: env_or("COLLAB_OUTBOUND_CAPACITY", defaults.outbound_capacity)?,
            max_frame_size: env_or("COLLAB_MAX_FRAME_SIZE", defaults.max_frame_size)?,
            idle_timeout: env_secs_or("COLLAB_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            ping_interval: env_secs_or("COLLAB_PING_INTERVAL_SECS", defaults.ping_interval)?,
            write_timeout: env_secs_or("COLLAB_WRITE_TIMEOUT_SECS", defaults.write_timeout)?,
            initial_document: env_or("COLLAB_INITIAL_DOCUMENT", defaults.initial_document)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the connection actors can't work with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.command_capacity == 0 || self.outbound_capacity == 0 {
            return Err(AppError::Config("queue capacities must be non-zero".into()));
        }
        if self.max_frame_size == 0 {
            return Err(AppError::Config("max frame size must be non-zero".into()));
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.idle_timeout {
            return Err(AppError::Config(format!(
                "ping interval ({:?}) must be non-zero and shorter than idle timeout ({:?})",
                self.ping_interval, self.idle_timeout
            )));
        }
        for path in [&self.ws_path, &self.snapshot_path] {
            if !path.starts_with('/') {
                return Err(AppError::Config(format!("path '{path}' must start with '/'")));
            }
            // Routed literally; captures and wildcards are not allowed
            if path.contains(['{', '}', ':', '*']) {
                return Err(AppError::Config(format!("path '{path}' must be a literal path")));
            }
        }
        if self.ws_path == self.snapshot_path {
            return Err(AppError::Config("ws and snapshot paths must differ".into()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key}: cannot parse '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn env_secs_or(key: &str, default: Duration) -> Result<Duration, AppError> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}
