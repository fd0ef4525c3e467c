// src/stack/memory.rs

//! In-memory protocol stack.
//!
//! This is the reference implementation of the [`ProtocolStack`] seam. It
//! performs no encoding and no network I/O: every entity handed to
//! `to_lower()` is queued on an in-process outbox that a test (or the
//! loopback task) reads.
//!
//! ## Semantics
//!
//! - `to_lower()` never blocks and keeps entities in submission order.
//! - Once the outbox is dropped, `to_lower()` fails with `RpcError::Stack`.
//!
//! ## Loopback
//!
//! [`spawn_loopback`] plays the remote server: group creation requests are
//! answered with a group-created notification and text messages with a
//! delivery receipt, both delivered on a task of their own, like the event
//! context of a real stack.

use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    CreateGroup,
    EntityHandler,
    GroupCreated,
    InboundEntity,
    Jid,
    NotificationEntity,
    NotificationKind,
    OutgoingEntity,
    ProtocolStack,
    ReceiptEntity,
    Result,
    RpcError,
    StackPtr,
};

struct MemoryStack {
    // ---
    outbox: mpsc::UnboundedSender<OutgoingEntity>,
}

#[async_trait]
impl ProtocolStack for MemoryStack {
    // ---

    async fn to_lower(&self, entity: OutgoingEntity) -> Result<()> {
        // ---
        self.outbox
            .send(entity)
            .map_err(|_| RpcError::Stack("memory stack outbox closed".into()))
    }
}

/// Receiving end of everything pushed into a memory stack.
pub struct MemoryOutbox {
    rx: mpsc::UnboundedReceiver<OutgoingEntity>,
}

impl MemoryOutbox {
    // ---

    /// Wait for the next outbound entity; `None` once every stack handle is gone.
    pub async fn recv(&mut self) -> Option<OutgoingEntity> {
        self.rx.recv().await
    }

    /// Next outbound entity if one is already queued.
    pub fn try_recv(&mut self) -> Option<OutgoingEntity> {
        self.rx.try_recv().ok()
    }
}

/// Create a new in-memory protocol stack and its outbox.
pub fn create_memory_stack() -> (StackPtr, MemoryOutbox) {
    // ---
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(MemoryStack { outbox: tx }), MemoryOutbox { rx })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Build the notification a server sends after creating the requested group.
///
/// The group id follows the `<creator>-<creation>` shape servers use.
pub fn group_created_for(request: &CreateGroup, creator: &Jid, creation: i64) -> InboundEntity {
    // ---
    let gid = format!("{}-{}", creator.user(), creation);
    InboundEntity::Notification(NotificationEntity {
        id: format!("{}-N", request.id),
        from: Jid::group(&gid),
        participant: Some(creator.clone()),
        timestamp: creation,
        kind: NotificationKind::GroupCreated(GroupCreated {
            subject: request.subject.clone(),
            creator: Some(creator.clone()),
            creation,
            participants: request.participants.clone(),
        }),
    })
}

/// Answer outbound entities the way a server would, on a separate task.
///
/// `creator` is the account the simulated server attributes created groups
/// to. The handler usually owns the stack feeding `outbox`, so it is held
/// weakly: the task ends once the handler is gone or every stack handle has
/// been dropped.
pub fn spawn_loopback(
    mut outbox: MemoryOutbox,
    creator: Jid,
    handler: Weak<dyn EntityHandler>,
) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        while let Some(entity) = outbox.recv().await {
            let reply = match entity {
                OutgoingEntity::CreateGroup(request) => {
                    group_created_for(&request, &creator, unix_now())
                }
                OutgoingEntity::TextMessage(message) => InboundEntity::Receipt(ReceiptEntity {
                    id: message.id,
                    from: message.to,
                    participant: None,
                    kind: None,
                }),
                other => {
                    log_debug!("loopback: nothing to answer for {other:?}");
                    continue;
                }
            };

            let Some(handler) = handler.upgrade() else {
                break;
            };
            handler.on_entity(reply).await;
        }
        log_debug!("loopback: memory stack closed");
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::TextMessage;

    #[tokio::test]
    async fn test_to_lower_reaches_outbox_in_order() {
        // ---
        let (stack, mut outbox) = create_memory_stack();
        let to = Jid::normalize("49176123456");

        stack
            .to_lower(OutgoingEntity::TextMessage(TextMessage::new(to.clone(), "one")))
            .await
            .unwrap();
        stack
            .to_lower(OutgoingEntity::TextMessage(TextMessage::new(to, "two")))
            .await
            .unwrap();

        for expected in ["one", "two"] {
            match outbox.recv().await {
                Some(OutgoingEntity::TextMessage(msg)) => assert_eq!(msg.body, expected),
                other => panic!("unexpected entity {other:?}"),
            }
        }
        assert!(outbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_closed_outbox_is_an_error() {
        // ---
        let (stack, outbox) = create_memory_stack();
        drop(outbox);

        let err = stack
            .to_lower(OutgoingEntity::TextMessage(TextMessage::new(Jid::normalize("1"), "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Stack(_)));
    }

    #[test]
    fn test_group_created_for() {
        // ---
        let request = CreateGroup::new(
            "S",
            vec![Jid::normalize("49176123456"), Jid::normalize("49175654321")],
        );
        let creator = Jid::normalize("49170000000");

        let InboundEntity::Notification(notification) =
            group_created_for(&request, &creator, 1_500_000_000)
        else {
            panic!("expected a notification");
        };

        assert_eq!(notification.from.as_str(), "49170000000-1500000000@g.us");
        let created = notification.group_created().unwrap();
        assert_eq!(created.subject, "S");
        assert_eq!(created.participants, request.participants);
    }
}
