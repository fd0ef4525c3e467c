// Inbound entity handling for the bridge.

use async_trait::async_trait;

use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    CommandOutput,
    CorrelationKey,
    EntityHandler,
    InboundEntity,
    LoginState,
    MessageEntity,
    NotificationEntity,
    OutgoingEntity,
};

use super::Bridge;

impl Bridge {
    // ---

    /// Handle one entity delivered up by the protocol stack.
    pub async fn handle_entity(&self, entity: InboundEntity) {
        // ---
        match entity {
            InboundEntity::Success(success) => {
                log_info!("logged in (creation {:?})", success.creation);
                self.connection().set(LoginState::Connected);
            }
            InboundEntity::Failure(failure) => {
                log_error!("login failed: {}", failure.reason);
                self.connection().set(LoginState::Failed(failure.reason));
            }
            InboundEntity::Message(message) => self.on_message(&message).await,
            InboundEntity::Receipt(receipt) => {
                log_debug!("receipt {} from {}", receipt.id, receipt.from);
                self.lower(receipt.ack()).await;
            }
            InboundEntity::ChatState(state) => {
                log_debug!("chat state {} from {}", state.state, state.from);
            }
            InboundEntity::Iq(iq) => {
                log_debug!("iq {} ({}) from {:?}", iq.id, iq.kind, iq.from);
            }
            InboundEntity::Notification(notification) => {
                self.on_notification(notification).await;
            }
        }
    }

    async fn on_message(&self, message: &MessageEntity) {
        // ---
        let sender = message.participant.as_ref().unwrap_or(&message.from);

        match (message.body(), message.media()) {
            (Some(body), _) => {
                log_info!(
                    "message {} from {} at {}: {body}",
                    message.id,
                    sender,
                    message.timestamp
                );
            }
            (None, Some(media)) => {
                log_info!(
                    "{} message {} from {} at {}: size {:?}, url {:?}",
                    media.media_type,
                    message.id,
                    sender,
                    message.timestamp,
                    media.size,
                    media.url
                );
            }
            (None, None) => {
                log_warn!("message {} from {} has no content", message.id, sender);
            }
        }

        self.lower(message.ack(false)).await;
        self.lower(message.ack(true)).await;
    }

    async fn on_notification(&self, notification: NotificationEntity) {
        // ---
        let ack = notification.ack();

        if let Some(created) = notification.group_created() {
            let key = CorrelationKey::from_jids(&created.participants);
            log_info!(
                "group {} created with {} participants, key {key}",
                notification.from,
                created.participants.len()
            );

            match self.groups().pop(&key) {
                Some(resolver) => {
                    if !resolver.resolve(CommandOutput::Notification(notification.clone())) {
                        log_debug!("group {key}: waiter already gone");
                    }
                }
                None => log_debug!("group {key}: no pending request"),
            }
        } else {
            log_debug!(
                "notification {} ({}) from {}",
                notification.id,
                notification.notification_type(),
                notification.from
            );
        }

        self.lower(ack).await;
    }

    async fn lower(&self, entity: OutgoingEntity) {
        // ---
        if let Err(e) = self.stack.to_lower(entity).await {
            log_error!("failed to hand entity to the stack: {e}");
        }
    }
}

#[async_trait]
impl EntityHandler for Bridge {
    // ---
    async fn on_entity(&self, entity: InboundEntity) {
        self.handle_entity(entity).await;
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::stack::{create_memory_stack, group_created_for, MemoryOutbox};
    use crate::{
        AckClass, CreateGroup, FailureEntity, GroupCreated, Jid, MessageContent,
        NotificationKind, RpcError, SuccessEntity,
    };
    use serde_json::json;
    use std::time::Duration;

    fn bridge() -> (Bridge, MemoryOutbox) {
        let (stack, outbox) = create_memory_stack();
        (Bridge::new(stack, Duration::from_secs(60)), outbox)
    }

    fn drain(outbox: &mut MemoryOutbox) -> Vec<OutgoingEntity> {
        std::iter::from_fn(|| outbox.try_recv()).collect()
    }

    fn created(participants: &[&str]) -> InboundEntity {
        // ---
        let request = CreateGroup::new(
            "S",
            participants.iter().map(|p| Jid::normalize(p)).collect(),
        );
        group_created_for(&request, &Jid::normalize("49170000000"), 1_500_000_000)
    }

    #[tokio::test]
    async fn test_notification_resolves_pending_group() {
        // ---
        let (bridge, mut outbox) = bridge();

        let pending = bridge
            .group_create(Some("S".into()), Some("49176123456,49175654321".into()))
            .await
            .unwrap();
        drain(&mut outbox);

        // Server lists the participants in a different order.
        bridge
            .handle_entity(created(&["49175654321", "49176123456"]))
            .await;

        let output = pending.wait(Duration::from_millis(50)).await.unwrap();
        let fields = output.extract();
        assert_eq!(fields["gid"], json!("49170000000-1500000000"));
        assert_eq!(fields["timestamp_creation"], json!(1_500_000_000));
        assert_eq!(fields["participants"], json!(["49175654321", "49176123456"]));
        assert!(bridge.groups().is_empty());

        match drain(&mut outbox).as_slice() {
            [OutgoingEntity::Ack(ack)] => {
                assert_eq!(ack.class, AckClass::Notification);
                assert_eq!(ack.kind.as_deref(), Some("w:gp2"));
            }
            other => panic!("unexpected entities {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unmatched_notification_is_acked_only() {
        // ---
        let (bridge, mut outbox) = bridge();

        let pending = bridge
            .group_create(Some("S".into()), Some("1,2".into()))
            .await
            .unwrap();
        drain(&mut outbox);

        bridge.handle_entity(created(&["1", "3"])).await;

        assert_eq!(bridge.groups().len(), 1);
        assert!(matches!(drain(&mut outbox).as_slice(), [OutgoingEntity::Ack(_)]));

        let err = pending.wait(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout));
    }

    #[tokio::test]
    async fn test_late_notification_is_a_miss() {
        // ---
        let (bridge, mut outbox) = bridge();

        let pending = bridge
            .group_create(Some("S".into()), Some("1,2".into()))
            .await
            .unwrap();
        assert!(pending.wait(Duration::from_millis(10)).await.is_err());

        bridge.handle_entity(created(&["1", "2"])).await;
        assert!(bridge.groups().is_empty());

        let acks = drain(&mut outbox)
            .into_iter()
            .filter(|e| matches!(e, OutgoingEntity::Ack(_)))
            .count();
        assert_eq!(acks, 1);
    }

    #[tokio::test]
    async fn test_other_notification_is_acked() {
        // ---
        let (bridge, mut outbox) = bridge();

        bridge
            .handle_entity(InboundEntity::Notification(NotificationEntity {
                id: "N9".into(),
                from: Jid::group("1-2"),
                participant: None,
                timestamp: 0,
                kind: NotificationKind::Other("picture".into()),
            }))
            .await;

        match drain(&mut outbox).as_slice() {
            [OutgoingEntity::Ack(ack)] => assert_eq!(ack.kind.as_deref(), Some("picture")),
            other => panic!("unexpected entities {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_message_gets_delivery_and_read_receipts() {
        // ---
        let (bridge, mut outbox) = bridge();

        bridge
            .handle_entity(InboundEntity::Message(MessageEntity {
                id: "M1".into(),
                from: Jid::normalize("49176123456"),
                participant: None,
                timestamp: 1_500_000_000,
                content: MessageContent::Text("hello".into()),
            }))
            .await;

        match drain(&mut outbox).as_slice() {
            [OutgoingEntity::Receipt(delivered), OutgoingEntity::Receipt(read)] => {
                assert_eq!(delivered.message_id, "M1");
                assert!(!delivered.read);
                assert!(read.read);
            }
            other => panic!("unexpected entities {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_state_tracking() {
        // ---
        let (bridge, _outbox) = bridge();
        assert_eq!(bridge.connection().get(), LoginState::Disconnected);

        bridge
            .handle_entity(InboundEntity::Success(SuccessEntity {
                creation: Some(1_500_000_000),
            }))
            .await;
        assert!(bridge.connection().is_connected());

        bridge
            .handle_entity(InboundEntity::Failure(FailureEntity {
                reason: "not-authorized".into(),
            }))
            .await;
        assert_eq!(
            bridge.connection().get(),
            LoginState::Failed("not-authorized".into())
        );
    }

    #[tokio::test]
    async fn test_duplicate_participants_share_a_key() {
        // ---
        let (bridge, mut outbox) = bridge();

        let pending = bridge
            .group_create(Some("S".into()), Some("2, 1, 2".into()))
            .await
            .unwrap();
        drain(&mut outbox);

        let notification = InboundEntity::Notification(NotificationEntity {
            id: "N1".into(),
            from: Jid::group("9-1"),
            participant: None,
            timestamp: 1,
            kind: NotificationKind::GroupCreated(GroupCreated {
                subject: "S".into(),
                creator: None,
                creation: 1,
                participants: vec![Jid::normalize("1"), Jid::normalize("2")],
            }),
        });
        bridge.on_entity(notification).await;

        assert!(pending.wait(Duration::from_millis(50)).await.is_ok());
    }
}
