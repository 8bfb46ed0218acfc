//! SQLite-backed sync cursor store.
//!
//! Lock acquisition runs on the single-writer actor inside an immediate
//! transaction, which makes the check-and-set atomic across processes that
//! share the database file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use uuid::Uuid;

use tallybook_core::sync::{StreamKey, SyncCursorStore};
use tallybook_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_cursors;

use super::model::SyncCursorDB;

pub struct SqliteCursorStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteCursorStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteCursorStore { pool, writer }
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn lock_is_live(row: &SyncCursorDB, now: DateTime<Utc>) -> bool {
    row.lock_token.is_some()
        && parse_timestamp(row.lock_expires_at.as_deref())
            .map(|at| at > now)
            .unwrap_or(false)
}

#[async_trait]
impl SyncCursorStore for SqliteCursorStore {
    fn last_synced_at(&self, key: &StreamKey) -> Result<Option<DateTime<Utc>>> {
        let mut conn = get_connection(&self.pool)?;
        let value = sync_cursors::table
            .find(key.cache_key())
            .select(sync_cursors::last_synced_at)
            .first::<Option<String>>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(parse_timestamp(value.flatten().as_deref()))
    }

    async fn record_synced_at(&self, key: &StreamKey, synced_at: DateTime<Utc>) -> Result<()> {
        let cache_key = key.cache_key();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let stamp = synced_at.to_rfc3339();
                diesel::insert_into(sync_cursors::table)
                    .values((
                        sync_cursors::cache_key.eq(&cache_key),
                        sync_cursors::last_synced_at.eq(Some(stamp.clone())),
                    ))
                    .on_conflict(sync_cursors::cache_key)
                    .do_update()
                    .set(sync_cursors::last_synced_at.eq(Some(stamp)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn try_acquire_lock(&self, key: &StreamKey, ttl: Duration) -> Result<Option<String>> {
        let cache_key = key.cache_key();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Option<String>> {
                let now = Utc::now();
                let row = sync_cursors::table
                    .find(&cache_key)
                    .first::<SyncCursorDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                if row.map(|r| lock_is_live(&r, now)).unwrap_or(false) {
                    return Ok(None);
                }

                let token = Uuid::new_v4().to_string();
                let expires_at =
                    (now + chrono::Duration::milliseconds(ttl.as_millis() as i64)).to_rfc3339();
                diesel::insert_into(sync_cursors::table)
                    .values((
                        sync_cursors::cache_key.eq(&cache_key),
                        sync_cursors::lock_token.eq(Some(token.clone())),
                        sync_cursors::lock_expires_at.eq(Some(expires_at.clone())),
                    ))
                    .on_conflict(sync_cursors::cache_key)
                    .do_update()
                    .set((
                        sync_cursors::lock_token.eq(Some(token.clone())),
                        sync_cursors::lock_expires_at.eq(Some(expires_at)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(Some(token))
            })
            .await
    }

    async fn release_lock(&self, key: &StreamKey, token: &str) -> Result<()> {
        let cache_key = key.cache_key();
        let token = token.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(
                    sync_cursors::table
                        .find(&cache_key)
                        .filter(sync_cursors::lock_token.eq(Some(token))),
                )
                .set((
                    sync_cursors::lock_token.eq(None::<String>),
                    sync_cursors::lock_expires_at.eq(None::<String>),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallybook_core::documents::DocumentStream;
    use tempfile::TempDir;

    fn setup() -> (SqliteCursorStore, TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = crate::db::init(dir.path().to_str().expect("utf8 path")).expect("init db");
        let pool = crate::db::create_pool(&db_path).expect("create pool");
        let writer = crate::db::spawn_writer(&db_path).expect("spawn writer");
        (SqliteCursorStore::new(pool, writer), dir)
    }

    #[tokio::test]
    async fn timestamp_round_trips_through_the_table() {
        let (store, _dir) = setup();
        let key = StreamKey::new(DocumentStream::Quotes);

        assert_eq!(store.last_synced_at(&key).expect("read"), None);
        let now = Utc::now();
        store.record_synced_at(&key, now).await.expect("record");

        let stored = store
            .last_synced_at(&key)
            .expect("read")
            .expect("timestamp present");
        // RFC3339 keeps sub-second precision, so the round trip is exact.
        assert_eq!(stored, now);
    }

    #[tokio::test]
    async fn lock_is_exclusive_and_released_by_token() {
        let (store, _dir) = setup();
        let key = StreamKey::new(DocumentStream::Billings);
        let ttl = Duration::from_secs(30);

        let token = store
            .try_acquire_lock(&key, ttl)
            .await
            .expect("acquire")
            .expect("first acquisition succeeds");
        assert!(store
            .try_acquire_lock(&key, ttl)
            .await
            .expect("acquire")
            .is_none());

        store.release_lock(&key, &token).await.expect("release");
        assert!(store
            .try_acquire_lock(&key, ttl)
            .await
            .expect("acquire")
            .is_some());
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimable() {
        let (store, _dir) = setup();
        let key = StreamKey::new(DocumentStream::Quotes);

        store
            .try_acquire_lock(&key, Duration::from_millis(0))
            .await
            .expect("acquire")
            .expect("acquisition succeeds");
        assert!(store
            .try_acquire_lock(&key, Duration::from_secs(30))
            .await
            .expect("acquire")
            .is_some());
    }

    #[tokio::test]
    async fn stale_token_does_not_release_current_holder() {
        let (store, _dir) = setup();
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
    async fn releasing_the_lock_keeps_the_timestamp() {
        let (store, _dir) = setup();
        let key = StreamKey::with_principal(DocumentStream::Quotes, "alice");

        let now = Utc::now();
        store.record_synced_at(&key, now).await.expect("record");
        let token = store
            .try_acquire_lock(&key, Duration::from_secs(30))
            .await
            .expect("acquire")
            .expect("token");
        store.release_lock(&key, &token).await.expect("release");

        assert_eq!(store.last_synced_at(&key).expect("read"), Some(now));
    }
}
