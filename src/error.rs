use thiserror::Error;

/// Errors that can occur while bridging RPC requests to the protocol stack
#[derive(Error, Debug)]
pub enum RpcError {
    /// Pending result was not resolved within the bounded wait
    #[error("timed out waiting for command result")]
    Timeout,

    /// The resolver side of a pending result was dropped without a value
    #[error("pending result abandoned before resolution")]
    ChannelClosed,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The RPC endpoint could not be bound
    #[error("failed to bind RPC endpoint {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Request decoded but is not a usable command request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No command registered under the requested name
    #[error("no handler found for command: {0}")]
    HandlerNotFound(String),

    /// The protocol stack refused an outbound entity
    #[error("protocol stack error: {0}")]
    Stack(String),

    /// Lifecycle operation not valid in the current server state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration value could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, RpcError>;
