//! Remote ledger synchronization engine.
//!
//! Pulls paginated document collections from the remote ledger, reconciles
//! them against local records through the entity matcher, performs idempotent
//! upserts, and tombstones records that disappeared remotely. At most one
//! sync runs per stream key at a time, and a throttle window bounds re-sync
//! frequency.

mod cursor;
mod engine;
mod mapper;
mod matcher;
mod model;

pub use cursor::*;
pub use engine::*;
pub use mapper::*;
pub use matcher::*;
pub use model::*;
