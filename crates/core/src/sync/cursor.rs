//! Sync cursor store: per-stream throttle timestamp and mutual-exclusion lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{DatabaseError, Error, Result};

use super::StreamKey;

/// Keyed store for sync cursors. One entry per stream key, created on first
/// use. The timestamp is only advanced on a fully successful run; the lock
/// carries a TTL so a crashed holder cannot block the stream forever.
#[async_trait]
pub trait SyncCursorStore: Send + Sync {
    fn last_synced_at(&self, key: &StreamKey) -> Result<Option<DateTime<Utc>>>;

    async fn record_synced_at(&self, key: &StreamKey, synced_at: DateTime<Utc>) -> Result<()>;

    /// Atomically acquire the stream lock. Returns a release token, or `None`
    /// when another run holds a live lock.
    async fn try_acquire_lock(&self, key: &StreamKey, ttl: Duration) -> Result<Option<String>>;

    /// Release the lock if the token still matches the current holder.
    async fn release_lock(&self, key: &StreamKey, token: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
struct CursorSlot {
    last_synced_at: Option<DateTime<Utc>>,
    lock_token: Option<String>,
    lock_expires_at: Option<DateTime<Utc>>,
}

/// Process-local cursor store for tests and single-process embeddings.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    slots: Mutex<HashMap<String, CursorSlot>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slot<T>(&self, key: &StreamKey, f: impl FnOnce(&mut CursorSlot) -> T) -> Result<T> {
        let mut slots = self.slots.lock().map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Cursor store mutex is poisoned".to_string(),
            ))
        })?;
        Ok(f(slots.entry(key.cache_key()).or_default()))
    }
}

#[async_trait]
impl SyncCursorStore for InMemoryCursorStore {
    fn last_synced_at(&self, key: &StreamKey) -> Result<Option<DateTime<Utc>>> {
        self.with_slot(key, |slot| slot.last_synced_at)
    }

    async fn record_synced_at(&self, key: &StreamKey, synced_at: DateTime<Utc>) -> Result<()> {
        self.with_slot(key, |slot| slot.last_synced_at = Some(synced_at))
    }

    async fn try_acquire_lock(&self, key: &StreamKey, ttl: Duration) -> Result<Option<String>> {
        self.with_slot(key, |slot| {
            let now = Utc::now();
            let held = slot.lock_token.is_some()
                && slot.lock_expires_at.map(|at| at > now).unwrap_or(false);
            if held {
                return None;
            }
            let token = Uuid::new_v4().to_string();
            slot.lock_token = Some(token.clone());
            slot.lock_expires_at =
                Some(now + chrono::Duration::milliseconds(ttl.as_millis() as i64));
            Some(token)
        })
    }

    async fn release_lock(&self, key: &StreamKey, token: &str) -> Result<()> {
        self.with_slot(key, |slot| {
            if slot.lock_token.as_deref() == Some(token) {
                slot.lock_token = None;
                slot.lock_expires_at = None;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::DocumentStream;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = InMemoryCursorStore::new();
        let key = StreamKey::new(DocumentStream::Quotes);
        let ttl = Duration::from_secs(30);

        let token = store
            .try_acquire_lock(&key, ttl)
            .await
            .expect("acquire")
            .expect("first acquisition succeeds");
        assert!(store.try_acquire_lock(&key, ttl).await.expect("acquire").is_none());

        store.release_lock(&key, &token).await.expect("release");
        assert!(store.try_acquire_lock(&key, ttl).await.expect("acquire").is_some());
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimable() {
        let store = InMemoryCursorStore::new();
        let key = StreamKey::new(DocumentStream::Billings);

        store
            .try_acquire_lock(&key, Duration::from_millis(0))
            .await
            .expect("acquire")
            .expect("acquisition succeeds");
        // TTL of zero expires immediately.
        assert!(store
            .try_acquire_lock(&key, Duration::from_secs(30))
            .await
            .expect("acquire")
            .is_some());
    }

    #[tokio::test]
    async fn stale_token_does_not_release_new_holder() {
        let store = InMemoryCursorStore::new();
        let key = StreamKey::new(DocumentStream::Quotes);

        let stale = store
            .try_acquire_lock(&key, Duration::from_millis(0))
            .await
            .expect("acquire")
            .expect("first acquisition");
        let _current = store
            .try_acquire_lock(&key, Duration::from_secs(30))
            .await
            .expect("acquire")
            .expect("reclaim expired lock");

        store.release_lock(&key, &stale).await.expect("release");
        assert!(store
            .try_acquire_lock(&key, Duration::from_secs(30))
            .await
            .expect("acquire")
            .is_none());
    }

    #[tokio::test]
    async fn cursors_are_partitioned_by_principal() {
        let store = InMemoryCursorStore::new();
        let shared = StreamKey::new(DocumentStream::Quotes);
        let alice = StreamKey::with_principal(DocumentStream::Quotes, "alice");

        let now = Utc::now();
        store.record_synced_at(&alice, now).await.expect("record");
        assert_eq!(store.last_synced_at(&shared).expect("read"), None);
        assert_eq!(store.last_synced_at(&alice).expect("read"), Some(now));
    }
}
