//! Database model for the sync cursor table.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(cache_key))]
#[diesel(table_name = crate::schema::sync_cursors)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncCursorDB {
    pub cache_key: String,
    pub last_synced_at: Option<String>,
    pub lock_token: Option<String>,
    pub lock_expires_at: Option<String>,
}
