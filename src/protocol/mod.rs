/// Wire types for the RPC endpoint
///
/// Requests and responses are flat JSON objects, one per line on the socket.
mod message;

pub use message::{RpcRequest, RpcResponse, Status, CMD_FIELD};
