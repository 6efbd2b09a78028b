use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::db::now_ms;

/// In-process idempotency reservations with a TTL window.
///
/// `reserve` is an atomic check-and-set under the write lock: it returns
/// `true` iff the key was absent or its previous reservation has expired.
/// This is a soft de-dupe window only; the unique index on
/// `notifications.idempotency_key` remains the hard guarantee.
#[derive(Clone)]
pub struct IdempotencyStore {
    entries: Arc<RwLock<HashMap<String, i64>>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        IdempotencyStore {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Reserve `key` for `ttl`. Returns `true` iff the key was not already
    /// reserved.
    pub async fn reserve(&self, key: &str, ttl: Duration) -> bool {
        let now = now_ms();
        let expires_at = now + ttl.as_millis() as i64;

        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(&existing) if existing > now => false,
            _ => {
                entries.insert(key.to_string(), expires_at);
                true
            }
        }
    }

    /// Drop expired reservations. Called from the daily maintenance task.
    pub async fn sweep_expired(&self) -> usize {
        let now = now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, &mut expires_at| expires_at > now);
        before - entries.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_reserve_within_ttl_is_rejected() {
        let store = IdempotencyStore::new();
        assert!(store.reserve("dup-1", Duration::from_secs(60)).await);
        assert!(!store.reserve("dup-1", Duration::from_secs(60)).await);
        // A different key is unaffected.
        assert!(store.reserve("dup-2", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn expired_reservation_can_be_taken_again() {
        let store = IdempotencyStore::new();
        assert!(store.reserve("k", Duration::from_millis(0)).await);
        // TTL of zero expires immediately.
        assert!(store.reserve("k", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_entries() {
        let store = IdempotencyStore::new();
        store.reserve("old", Duration::from_millis(0)).await;
        store.reserve("fresh", Duration::from_secs(60)).await;

        let dropped = store.sweep_expired().await;
        assert_eq!(dropped, 1);
        assert_eq!(store.len().await, 1);
        assert!(!store.reserve("fresh", Duration::from_secs(60)).await);
    }
}
