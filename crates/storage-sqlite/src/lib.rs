//! SQLite storage for tallybook.
//!
//! Implements the core repository traits over diesel with an r2d2 read pool
//! and a single-writer actor for all mutations.

pub mod db;
pub mod documents;
pub mod errors;
pub mod schema;
pub mod sync;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use documents::DocumentRepository;
pub use errors::StorageError;
pub use sync::SqliteCursorStore;
