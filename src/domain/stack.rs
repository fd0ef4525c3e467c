// src/domain/stack.rs

//! Protocol stack domain abstractions.
//!
//! The messaging-protocol stack (authentication, encryption, wire encoding,
//! network) is an external collaborator. This module defines the narrow
//! surface the bridge uses to talk to it:
//!
//! - [`OutgoingEntity`]: actions pushed down into the stack
//! - [`InboundEntity`]: entities the stack delivers up to the bridge
//! - [`LayerEvent`]: lifecycle signals broadcast by the hosting process
//!
//! Nothing here knows how entities are encoded on the wire. Concrete stacks
//! live under `src/stack/`.

use crate::{Jid, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

fn entity_id() -> String {
    // ---
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Lifecycle events broadcast through the layer stack by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerEvent {
    /// Bind the RPC endpoint and begin serving.
    Start,
    /// Stop serving and release the endpoint.
    Stop,
    /// Host asks the network layer to connect.
    Connect,
    /// Host asks the network layer to disconnect.
    Disconnect,
}

// ---------------------------------------------------------------------------
// Outgoing
// ---------------------------------------------------------------------------

/// Outbound text message.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub id: String,
    pub to: Jid,
    pub body: Bytes,
}

impl TextMessage {
    pub fn new(to: Jid, body: impl Into<Bytes>) -> Self {
        // ---
        Self {
            id: entity_id(),
            to,
            body: body.into(),
        }
    }
}

/// Group creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateGroup {
    pub id: String,
    pub subject: String,
    pub participants: Vec<Jid>,
}

impl CreateGroup {
    pub fn new(subject: impl Into<String>, participants: Vec<Jid>) -> Self {
        // ---
        Self {
            id: entity_id(),
            subject: subject.into(),
            participants,
        }
    }
}

/// Delivery or read receipt for an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingReceipt {
    pub message_id: String,
    pub to: Jid,
    pub participant: Option<Jid>,
    pub read: bool,
}

/// What an [`Ack`] acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckClass {
    Receipt,
    Notification,
}

/// Acknowledgement of an inbound receipt or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub id: String,
    pub class: AckClass,
    pub to: Jid,
    pub kind: Option<String>,
    pub participant: Option<Jid>,
}

/// Entity pushed down into the protocol stack.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingEntity {
    TextMessage(TextMessage),
    CreateGroup(CreateGroup),
    Receipt(OutgoingReceipt),
    Ack(Ack),
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Login accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessEntity {
    pub creation: Option<i64>,
}

/// Login rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureEntity {
    pub reason: String,
}

/// Media metadata of an inbound media message.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAttributes {
    pub media_type: String,
    pub size: Option<u64>,
    pub url: Option<String>,
}

/// Content of an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Media(MediaAttributes),
}

/// Inbound chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntity {
    pub id: String,
    pub from: Jid,
    pub participant: Option<Jid>,
    pub timestamp: i64,
    pub content: MessageContent,
}

impl MessageEntity {
    // ---

    /// "text" or "media".
    pub fn message_type(&self) -> &'static str {
        match self.content {
            MessageContent::Text(_) => "text",
            MessageContent::Media(_) => "media",
        }
    }

    pub fn body(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(body) => Some(body),
            MessageContent::Media(_) => None,
        }
    }

    pub fn media(&self) -> Option<&MediaAttributes> {
        match &self.content {
            MessageContent::Media(media) => Some(media),
            MessageContent::Text(_) => None,
        }
    }

    /// Receipt for this message; `read` marks it as read instead of delivered.
    pub fn ack(&self, read: bool) -> OutgoingEntity {
        // ---
        OutgoingEntity::Receipt(OutgoingReceipt {
            message_id: self.id.clone(),
            to: self.from.clone(),
            participant: self.participant.clone(),
            read,
        })
    }
}

/// Inbound delivery/read receipt for something we sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptEntity {
    pub id: String,
    pub from: Jid,
    pub participant: Option<Jid>,
    pub kind: Option<String>,
}

impl ReceiptEntity {
    pub fn ack(&self) -> OutgoingEntity {
        // ---
        OutgoingEntity::Ack(Ack {
            id: self.id.clone(),
            class: AckClass::Receipt,
            to: self.from.clone(),
            kind: self.kind.clone(),
            participant: self.participant.clone(),
        })
    }
}

/// Typing indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatStateEntity {
    pub from: Jid,
    pub state: String,
}

/// Generic info/query stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct IqEntity {
    pub id: String,
    pub from: Option<Jid>,
    pub kind: String,
}

/// Payload of a group-created notification.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCreated {
    pub subject: String,
    pub creator: Option<Jid>,
    pub creation: i64,
    /// Participants in the order the server listed them.
    pub participants: Vec<Jid>,
}

/// Notification body.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    GroupCreated(GroupCreated),
    Other(String),
}

/// Unsolicited notification from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntity {
    pub id: String,
    pub from: Jid,
    pub participant: Option<Jid>,
    pub timestamp: i64,
    pub kind: NotificationKind,
}

impl NotificationEntity {
    // ---

    /// Notification type as named by the protocol.
    pub fn notification_type(&self) -> &str {
        match &self.kind {
            NotificationKind::GroupCreated(_) => "w:gp2",
            NotificationKind::Other(kind) => kind,
        }
    }

    pub fn group_created(&self) -> Option<&GroupCreated> {
        match &self.kind {
            NotificationKind::GroupCreated(created) => Some(created),
            NotificationKind::Other(_) => None,
        }
    }

    pub fn ack(&self) -> OutgoingEntity {
        // ---
        OutgoingEntity::Ack(Ack {
            id: self.id.clone(),
            class: AckClass::Notification,
            to: self.from.clone(),
            kind: Some(self.notification_type().to_string()),
            participant: self.participant.clone(),
        })
    }
}

/// Entity delivered up from the protocol stack.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEntity {
    Success(SuccessEntity),
    Failure(FailureEntity),
    Message(MessageEntity),
    Receipt(ReceiptEntity),
    ChatState(ChatStateEntity),
    Iq(IqEntity),
    Notification(NotificationEntity),
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Downward interface of the protocol stack.
///
/// `to_lower` queues an entity for encoding and transmission. It does not
/// wait for any server confirmation; confirmations come back later as
/// [`InboundEntity`] values.
#[async_trait]
pub trait ProtocolStack: Send + Sync {
    // ---
    /// Hand an entity to the layer below.
    async fn to_lower(&self, entity: OutgoingEntity) -> Result<()>;
}

/// Shared protocol stack pointer.
pub type StackPtr = Arc<dyn ProtocolStack>;

/// Upward interface: receives entities on the protocol stack's event context.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    // ---
    async fn on_entity(&self, entity: InboundEntity);
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        // ---
        let a = TextMessage::new(Jid::normalize("1"), "a");
        let b = TextMessage::new(Jid::normalize("1"), "a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }

    #[test]
    fn test_message_ack() {
        // ---
        let msg = MessageEntity {
            id: "ABC".into(),
            from: Jid::normalize("49176123456"),
            participant: None,
            timestamp: 1_500_000_000,
            content: MessageContent::Text("hi".into()),
        };
        assert_eq!(msg.message_type(), "text");
        assert_eq!(msg.body(), Some("hi"));

        match msg.ack(true) {
            OutgoingEntity::Receipt(receipt) => {
                assert_eq!(receipt.message_id, "ABC");
                assert_eq!(receipt.to, msg.from);
                assert!(receipt.read);
            }
            other => panic!("unexpected entity {other:?}"),
        }
    }

    #[test]
    fn test_notification_ack() {
        // ---
        let notification = NotificationEntity {
            id: "N1".into(),
            from: Jid::group("4917612-1500000000"),
            participant: None,
            timestamp: 1_500_000_000,
            kind: NotificationKind::Other("picture".into()),
        };
        assert!(notification.group_created().is_none());

        match notification.ack() {
            OutgoingEntity::Ack(ack) => {
                assert_eq!(ack.class, AckClass::Notification);
                assert_eq!(ack.kind.as_deref(), Some("picture"));
            }
            other => panic!("unexpected entity {other:?}"),
        }
    }
}
