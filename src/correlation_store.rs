//! Correlation store.
//!
//! Maps a [`CorrelationKey`] to the [`Resolver`] of an in-flight command.
//! Command handlers insert (RPC worker context), notification handlers pop
//! (protocol stack context); both go through one mutex.
//!
//! Entries leave the store in exactly one of three ways:
//! - popped by a matching notification
//! - released when the waiting [`PendingResult`] finishes without a value
//! - evicted after `ttl` on a later insert

use crate::pending::{PendingResult, Resolver};
use crate::{log_debug, CommandOutput, CorrelationKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

struct Entry {
    ticket: u64,
    inserted: Instant,
    resolver: Resolver,
}

struct Inner {
    entries: HashMap<CorrelationKey, Entry>,
    next_ticket: u64,
    ttl: Duration,
}

impl Inner {
    // ---

    fn evict_expired(&mut self) -> usize {
        // ---
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let keep = entry.inserted.elapsed() < ttl;
            if !keep {
                log_debug!("evicting expired correlation entry {key}");
            }
            keep
        });
        before - self.entries.len()
    }
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Thread-safe map from fingerprint to pending resolver.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone)]
pub struct CorrelationStore {
    inner: Arc<Mutex<Inner>>,
}

impl CorrelationStore {
    // ---

    /// Create an empty store whose unresolved entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        // ---
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                next_ticket: 0,
                ttl,
            })),
        }
    }

    /// Register a new pending result under `key`.
    ///
    /// Expired entries are evicted first. An existing entry under the same
    /// key is replaced; its waiter observes a closed channel.
    pub fn register(&self, key: CorrelationKey) -> PendingResult {
        // ---
        let (tx, rx) = oneshot::channel();

        let mut inner = lock_ignore_poison(&self.inner);
        inner.evict_expired();

        let ticket = inner.next_ticket;
        inner.next_ticket = inner.next_ticket.wrapping_add(1);

        let entry = Entry {
            ticket,
            inserted: Instant::now(),
            resolver: Resolver::from_sender(tx),
        };
        if inner.entries.insert(key.clone(), entry).is_some() {
            log_debug!("replaced pending correlation entry {key}");
        }
        drop(inner);

        let registration = Registration {
            store: Arc::downgrade(&self.inner),
            key,
            ticket,
        };
        PendingResult::registered(rx, registration)
    }

    /// Remove and return the resolver for `key`.
    ///
    /// An absent key is a correlation miss and simply yields `None`.
    pub fn pop(&self, key: &CorrelationKey) -> Option<Resolver> {
        // ---
        lock_ignore_poison(&self.inner)
            .entries
            .remove(key)
            .map(|entry| entry.resolver)
    }

    /// Pop the entry for `key` and resolve it with `value`.
    ///
    /// Returns true only if an entry existed and its waiter received the
    /// value.
    pub fn resolve(&self, key: &CorrelationKey, value: CommandOutput) -> bool {
        // ---
        match self.pop(key) {
            Some(resolver) => resolver.resolve(value),
            None => false,
        }
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        lock_ignore_poison(&self.inner).entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry older than the configured ttl; returns how many.
    pub fn evict_expired(&self) -> usize {
        lock_ignore_poison(&self.inner).evict_expired()
    }
}

/// Ties a [`PendingResult`] to its store entry.
///
/// Dropping it removes the entry, but only if the entry still carries the
/// same ticket; a newer registration under the same key is left alone.
pub(crate) struct Registration {
    store: Weak<Mutex<Inner>>,
    key: CorrelationKey,
    ticket: u64,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // ---
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let mut inner = lock_ignore_poison(&store);
        let ours = inner
            .entries
            .get(&self.key)
            .is_some_and(|entry| entry.ticket == self.ticket);
        if ours {
            inner.entries.remove(&self.key);
            log_debug!("released unresolved correlation entry {}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::RpcError;

    fn key(a: &str, b: &str) -> CorrelationKey {
        CorrelationKey::from_identifiers([a, b])
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        // ---
        let store = CorrelationStore::new(Duration::from_secs(60));
        let k = key("49176123456", "49175654321");

        let pending = store.register(k.clone());
        assert_eq!(store.len(), 1);

        assert!(store.resolve(&k, CommandOutput::Done));
        assert!(store.is_empty());

        let value = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(value, CommandOutput::Done));
    }

    #[test]
    fn test_pop_twice() {
        // ---
        let store = CorrelationStore::new(Duration::from_secs(60));
        let k = key("1", "2");

        let _pending = store.register(k.clone());
        assert!(store.pop(&k).is_some());
        assert!(store.pop(&k).is_none());
    }

    #[test]
    fn test_miss_leaves_other_entries() {
        // ---
        let store = CorrelationStore::new(Duration::from_secs(60));
        let k1 = key("1", "2");
        let k2 = key("3", "4");

        let _pending = store.register(k1.clone());

        assert!(!store.resolve(&k2, CommandOutput::Done));
        assert!(store.contains(&k1));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_releases_entry() {
        // ---
        let store = CorrelationStore::new(Duration::from_secs(60));
        let k = key("1", "2");

        let pending = store.register(k.clone());
        let err = pending.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout));

        assert!(!store.contains(&k));
        // Late notification is a plain miss.
        assert!(!store.resolve(&k, CommandOutput::Done));
    }

    #[tokio::test]
    async fn test_stale_release_keeps_newer_entry() {
        // ---
        let store = CorrelationStore::new(Duration::from_secs(60));
        let k = key("1", "2");

        let first = store.register(k.clone());
        let second = store.register(k.clone());

        // First waiter lost its resolver when it was replaced.
        let err = first.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, RpcError::ChannelClosed));
        assert!(store.contains(&k));

        assert!(store.resolve(&k, CommandOutput::Done));
        assert!(second.wait(Duration::from_secs(1)).await.is_ok());
    }

    #[test]
    fn test_ttl_eviction_on_insert() {
        // ---
        let store = CorrelationStore::new(Duration::ZERO);
        let k1 = key("1", "2");
        let k2 = key("3", "4");

        let _p1 = store.register(k1.clone());
        let _p2 = store.register(k2.clone());

        assert!(!store.contains(&k1));
        assert!(store.contains(&k2));
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }
}
