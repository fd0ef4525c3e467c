//! Domain layer public interface.
//!
//! Types describing the external protocol stack, independent of any concrete
//! stack implementation.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod stack;

// --- Protocol stack domain re-exports ---

pub use stack::{
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
