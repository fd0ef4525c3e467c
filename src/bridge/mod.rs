//! Bridge layer.
//!
//! Sits on top of the protocol stack. Downwards it implements the remote
//! commands; upwards it consumes inbound entities and resolves the pending
//! results of commands that wait for a server notification.
//!
//! `group_create` is the only command that waits: the server answers group
//! creation with an unsolicited notification, so the command registers a
//! pending result under the fingerprint of its participant set and the
//! notification handler pops it using the same fingerprint.

mod notifications;
mod output;

pub use output::CommandOutput;

use crate::{
    // ---
    jid::parse_participants,
    log_error,
    log_info,
    log_warn,
    CorrelationKey,
    CorrelationStore,
    CreateGroup,
    Jid,
    OutgoingEntity,
    PendingResult,
    StackPtr,
    TextMessage,
};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Login state reported by the protocol stack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    Disconnected,
    Connected,
    /// Login rejected, with the server's reason.
    Failed(String),
}

/// Shared connection flag, written by the stack's event context.
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    state: Mutex<LoginState>,
}

impl ConnectionStatus {
    // ---

    fn guard(&self) -> MutexGuard<'_, LoginState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self) -> LoginState {
        self.guard().clone()
    }

    pub fn set(&self, state: LoginState) {
        *self.guard() = state;
    }

    pub fn is_connected(&self) -> bool {
        *self.guard() == LoginState::Connected
    }
}

/// Remote command target and inbound entity handler.
pub struct Bridge {
    stack: StackPtr,
    groups: CorrelationStore,
    connection: ConnectionStatus,
}

crate::remote_commands! {
    Bridge {
        message_send(number, msg);
        group_create(subject, numbers);
    }
}

impl Bridge {
    // ---

    /// Create a bridge over `stack`; unresolved group creations expire after
    /// `pending_ttl`.
    pub fn new(stack: StackPtr, pending_ttl: Duration) -> Self {
        // ---
        Self {
            stack,
            groups: CorrelationStore::new(pending_ttl),
            connection: ConnectionStatus::default(),
        }
    }

    /// Pending group creations, keyed by participant fingerprint.
    pub fn groups(&self) -> &CorrelationStore {
        &self.groups
    }

    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// Send a text message to `number` (bare number or jid).
    ///
    /// The stack gives no synchronous delivery confirmation, so the result is
    /// already resolved with [`CommandOutput::Done`] once the message has been
    /// handed down.
    pub async fn message_send(
        &self,
        number: Option<String>,
        msg: Option<String>,
    ) -> Option<PendingResult> {
        // ---
        let Some(number) = number else {
            log_warn!("message_send: missing recipient");
            return None;
        };

        let to = Jid::normalize(&number);
        let body = msg.unwrap_or_default().into_bytes();

        log_info!("message_send: to {to}, {} bytes", body.len());

        let entity = OutgoingEntity::TextMessage(TextMessage::new(to, body));
        if let Err(e) = self.stack.to_lower(entity).await {
            log_error!("message_send: stack refused message: {e}");
            return None;
        }

        Some(PendingResult::ready(CommandOutput::Done))
    }

    /// Create a group with `subject` and the comma-separated `numbers`.
    ///
    /// Needs at least two distinct participants. The returned result resolves
    /// when the server's group-created notification for the same participant
    /// set arrives.
    pub async fn group_create(
        &self,
        subject: Option<String>,
        numbers: Option<String>,
    ) -> Option<PendingResult> {
        // ---
        let jids = numbers.as_deref().map(parse_participants).unwrap_or_default();

        if jids.len() < 2 {
            log_warn!(
                "group_create: need at least 2 distinct participants, got {}",
                jids.len()
            );
            return None;
        }

        let subject = subject.unwrap_or_default();
        let key = CorrelationKey::from_jids(&jids);

        log_info!("group_create: subject {subject:?}, participants {jids:?}, key {key}");

        // Register before submitting so a fast notification cannot miss.
        let pending = self.groups.register(key);

        let entity = OutgoingEntity::CreateGroup(CreateGroup::new(subject, jids));
        if let Err(e) = self.stack.to_lower(entity).await {
            log_error!("group_create: stack refused request: {e}");
            // Dropping the pending result releases its store entry.
            return None;
        }

        Some(pending)
    }
}
