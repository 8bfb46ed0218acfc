//! Tallybook core: domain models and the remote ledger synchronization engine.

pub mod documents;
pub mod errors;
pub mod sync;

pub use errors::{Error, Result};
