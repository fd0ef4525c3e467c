use crate::{NotificationEntity, NotificationKind};
use serde_json::{json, Map, Value};

/// Value delivered through a command's pending result.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Action submitted; nothing further to report.
    Done,
    /// The notification that answered the command.
    Notification(NotificationEntity),
}

impl CommandOutput {
    // ---

    /// Fields merged into a success response.
    ///
    /// A group-created notification yields `gid` (group id without server),
    /// `timestamp_creation` and `participants` (bare numbers, notification
    /// order). Everything else yields no extra fields.
    pub fn extract(&self) -> Map<String, Value> {
        // ---
        let mut fields = Map::new();

        let CommandOutput::Notification(notification) = self else {
            return fields;
        };
        let NotificationKind::GroupCreated(created) = &notification.kind else {
            return fields;
        };

        let participants: Vec<&str> = created.participants.iter().map(|jid| jid.user()).collect();

        fields.insert("gid".into(), json!(notification.from.user()));
        fields.insert("timestamp_creation".into(), json!(created.creation));
        fields.insert("participants".into(), json!(participants));
        fields
    }
}
