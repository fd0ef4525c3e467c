//! Bridge configuration.
//!
//! Holds the RPC endpoint address and the two timing knobs of the
//! correlation engine. Credentials and protocol-stack settings are owned by
//! the hosting process, not by this type.

use crate::{Result, RpcError};
use std::str::FromStr;
use std::time::Duration;

/// Default RPC endpoint.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5555";

/// Default bounded wait for a command's pending result.
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of an unresolved correlation entry.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(60);

/// Default upper bound on one request line.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;

const ENV_BIND_ADDR: &str = "BRIDGE_RPC_ADDR";
const ENV_RESULT_TIMEOUT_MS: &str = "BRIDGE_RESULT_TIMEOUT_MS";
const ENV_PENDING_TTL_SECS: &str = "BRIDGE_PENDING_TTL_SECS";
const ENV_MAX_REQUEST_BYTES: &str = "BRIDGE_MAX_REQUEST_BYTES";

/// RPC endpoint and correlation settings.
///
/// # Example
///
/// ```
/// use yowsup_rpc_bridge::RpcConfig;
/// use std::time::Duration;
///
/// let config = RpcConfig::default()
///     .with_bind_addr("127.0.0.1:0")
///     .with_result_timeout(Duration::from_millis(250));
/// assert_eq!(config.bind_addr, "127.0.0.1:0");
/// ```
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Socket address the RPC server binds to (`host:port`).
    pub bind_addr: String,

    /// How long the server waits for a command's pending result before
    /// replying with a failure.
    ///
    /// Default: 5 seconds
    pub result_timeout: Duration,

    /// Age after which an unresolved correlation entry is evicted on the next
    /// insert, even if its waiter never cleaned it up.
    ///
    /// Default: 60 seconds
    pub pending_ttl: Duration,

    /// Longest request line accepted, terminator excluded. Longer lines are
    /// discarded and answered with a failure.
    ///
    /// Default: 64 KiB
    pub max_request_bytes: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        // ---
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            result_timeout: DEFAULT_RESULT_TIMEOUT,
            pending_ttl: DEFAULT_PENDING_TTL,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl RpcConfig {
    // ---

    /// Build a config from the environment, falling back to defaults.
    ///
    /// Reads `BRIDGE_RPC_ADDR`, `BRIDGE_RESULT_TIMEOUT_MS`,
    /// `BRIDGE_PENDING_TTL_SECS` and `BRIDGE_MAX_REQUEST_BYTES`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if a numeric variable is set but
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        // ---
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // ---
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = addr;
        }
        if let Some(raw) = lookup(ENV_RESULT_TIMEOUT_MS) {
            config.result_timeout = Duration::from_millis(parse_number(ENV_RESULT_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_PENDING_TTL_SECS) {
            config.pending_ttl = Duration::from_secs(parse_number(ENV_PENDING_TTL_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_REQUEST_BYTES) {
            config.max_request_bytes = parse_number(ENV_MAX_REQUEST_BYTES, &raw)?;
        }

        Ok(config)
    }

    /// Set the RPC endpoint address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the bounded wait for pending results.
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    /// Set the eviction age for unresolved correlation entries.
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit;
        self
    }
}

fn parse_number<N: FromStr>(key: &str, raw: &str) -> Result<N> {
    // ---
    raw.trim()
        .parse()
        .map_err(|_| RpcError::InvalidConfig(format!("{key}={raw:?} is not a whole number")))
}
