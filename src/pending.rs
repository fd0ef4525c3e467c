//! Single-assignment result cells.
//!
//! A [`PendingResult`] is handed back by a command to the RPC server, which
//! waits on it with a bound. The matching [`Resolver`] lives wherever the
//! answer will come from, usually a [`CorrelationStore`](crate::CorrelationStore)
//! entry resolved by a notification handler on the protocol stack's context.
//!
//! Resolving consumes the resolver, so a result can be assigned at most once.

use crate::correlation_store::Registration;
use crate::{CommandOutput, Result, RpcError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time;

/// Create an unregistered resolver / pending result pair.
pub fn pending() -> (Resolver, PendingResult) {
    // ---
    let (tx, rx) = oneshot::channel();
    (
        Resolver::from_sender(tx),
        PendingResult {
            rx,
            registration: None,
        },
    )
}

/// Write side of a pending result.
#[derive(Debug)]
pub struct Resolver {
    tx: oneshot::Sender<CommandOutput>,
}

impl Resolver {
    // ---

    pub(crate) fn from_sender(tx: oneshot::Sender<CommandOutput>) -> Self {
        Self { tx }
    }

    /// Deliver the value.
    ///
    /// Returns false if nobody is waiting anymore (the waiter timed out or was
    /// dropped). That is not an error for the caller.
    pub fn resolve(self, value: CommandOutput) -> bool {
        // ---
        self.tx.send(value).is_ok()
    }

    /// True once the waiting side is gone.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read side of a pending result.
///
/// States: pending until [`wait`](Self::wait) returns; then either resolved
/// (`Ok`) or timed out (`Err(RpcError::Timeout)`).
///
/// If the result was registered in a correlation store, finishing the wait
/// without a value removes that registration, so a late answer becomes a
/// correlation miss instead of landing on an entry nobody watches.
#[derive(Debug)]
pub struct PendingResult {
    rx: oneshot::Receiver<CommandOutput>,
    registration: Option<Registration>,
}

impl PendingResult {
    // ---

    /// A result that is already available.
    pub fn ready(value: CommandOutput) -> Self {
        // ---
        let (resolver, pending) = pending();
        resolver.resolve(value);
        pending
    }

    pub(crate) fn registered(rx: oneshot::Receiver<CommandOutput>, registration: Registration) -> Self {
        // ---
        Self {
            rx,
            registration: Some(registration),
        }
    }

    /// Block (asynchronously) until the value arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Timeout`] if nothing arrived in time
    /// - [`RpcError::ChannelClosed`] if the resolver was dropped unresolved
    pub async fn wait(self, timeout: Duration) -> Result<CommandOutput> {
        // ---
        let Self { rx, registration } = self;

        let outcome = time::timeout(timeout, rx).await;

        // Dropping the registration clears the store entry if it is still ours.
        drop(registration);

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(RpcError::ChannelClosed),
            Err(_) => Err(RpcError::Timeout),
        }
    }
}
