//! SQLite persistence for sync cursors and the stream lock.

mod model;
mod repository;

pub use model::SyncCursorDB;
pub use repository::SqliteCursorStore;
