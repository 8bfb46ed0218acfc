//! Database bootstrap: connection pool, pragmas, migrations, and the
//! single-writer actor.
//!
//! Reads go straight to the r2d2 pool; every write funnels through one
//! dedicated connection owned by a writer thread, so SQLite never sees two
//! concurrent write transactions from this process.

use std::path::Path;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::{Connection, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use tallybook_core::errors::{DatabaseError, Error};

use crate::errors::StorageError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILE_NAME: &str = "tallybook.db";
const CONNECTION_PRAGMAS: &str =
    "PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;";

#[derive(Debug)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Resolve the database file path inside the app data directory, creating
/// the directory if needed, and bring the schema up to date.
pub fn init(app_data_dir: &str) -> Result<String, StorageError> {
    std::fs::create_dir_all(app_data_dir)
        .map_err(|e| StorageError::Connection(format!("Failed to create data dir: {}", e)))?;
    let db_path = Path::new(app_data_dir)
        .join(DB_FILE_NAME)
        .to_string_lossy()
        .to_string();
    run_migrations(&db_path)?;
    Ok(db_path)
}

/// Run pending embedded migrations against the database file.
pub fn run_migrations(db_path: &str) -> Result<(), StorageError> {
    let mut conn = SqliteConnection::establish(db_path)
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    conn.batch_execute(CONNECTION_PRAGMAS)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        debug!("[Storage] Applied {} migrations", applied.len());
    }
    Ok(())
}

/// Build the read pool.
pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>, StorageError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(10)
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)?;
    Ok(Arc::new(pool))
}

/// Get a pooled connection for a synchronous read.
pub fn get_connection(pool: &Arc<DbPool>) -> tallybook_core::Result<DbConnection> {
    pool.get()
        .map_err(|e| Error::Database(DatabaseError::ConnectionUnavailable(e.to_string())))
}

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Handle to the single-writer actor. Cheap to clone; every `exec` runs its
/// closure inside an immediate transaction on the writer's connection.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriteHandle {
    pub async fn exec<T, F>(&self, f: F) -> tallybook_core::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> tallybook_core::Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: WriteJob = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<T, StorageError, _>(|tx| {
                    f(tx).map_err(StorageError::Domain)
                })
                .map_err(Error::from);
            let _ = reply_tx.send(result);
        });

        self.tx.send(job).map_err(|_| {
            Error::Database(DatabaseError::ConnectionUnavailable(
                "Write actor is not running".to_string(),
            ))
        })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Write actor dropped the reply channel".to_string(),
            ))
        })?
    }
}

/// Spawn the writer thread with its dedicated connection.
pub fn spawn_writer(db_path: &str) -> Result<WriteHandle, StorageError> {
    let mut conn = SqliteConnection::establish(db_path)
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    conn.batch_execute(CONNECTION_PRAGMAS)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
    std::thread::Builder::new()
        .name("tallybook-db-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                job(&mut conn);
            }
            debug!("[Storage] Write actor shutting down");
        })
        .map_err(|e| {
            error!("[Storage] Failed to spawn write actor: {}", e);
            StorageError::Connection(e.to_string())
        })?;

    Ok(WriteHandle { tx })
}
