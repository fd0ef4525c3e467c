//! RPC bridge in front of a messaging-protocol stack
//!
//! Remote callers send single-line JSON requests naming a command (send a
//! text message, create a group); the bridge turns them into protocol
//! actions and answers with exactly one response per request. Commands whose
//! outcome only arrives later as an unsolicited protocol notification (group
//! creation) are matched back to their request through a fingerprint of the
//! participant set.
//!
//! The protocol stack itself is an external collaborator reached through the
//! [`ProtocolStack`] and [`EntityHandler`] seams.
//!

// Import all sub modules once...
mod bridge;
mod broker_layer;
mod domain;
mod protocol;
mod registry;
mod server;
mod stack;

mod rpc_config;

mod correlation;
mod correlation_store;
mod error;
mod jid;
mod macros;
mod pending;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use bridge::{Bridge, CommandOutput, ConnectionStatus, LoginState};
pub use broker_layer::BrokerLayer;
pub use server::{RpcServer, ServerState};

pub use rpc_config::{
    RpcConfig, DEFAULT_BIND_ADDR, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_PENDING_TTL,
    DEFAULT_RESULT_TIMEOUT,
};

pub use correlation::CorrelationKey;
pub use correlation_store::CorrelationStore;
pub use error::{Result, RpcError};
pub use jid::{parse_participants, Jid, GROUP_SERVER, USER_SERVER};
pub use pending::{pending, PendingResult, Resolver};

pub use protocol::{RpcRequest, RpcResponse, Status, CMD_FIELD};
pub use registry::{BoxFuture, CommandDescriptor, CommandFn, CommandRegistry, FromArg, RemoteCommands};

pub use stack::{create_memory_stack, group_created_for, spawn_loopback, MemoryOutbox};

// --- public re-exports
pub use domain::{
    //
    Ack,
    AckClass,
    ChatStateEntity,
    CreateGroup,
    EntityHandler,
    FailureEntity,
    GroupCreated,
    InboundEntity,
    IqEntity,
    LayerEvent,
    MediaAttributes,
    MessageContent,
    MessageEntity,
    NotificationEntity,
    NotificationKind,
    OutgoingEntity,
    OutgoingReceipt,
    ProtocolStack,
    ReceiptEntity,
    StackPtr,
    SuccessEntity,
    TextMessage,
};
