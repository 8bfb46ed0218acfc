//! Remote ledger API client.
//!
//! Implements `tallybook_core::sync::LedgerPageSource` over the ledger
//! service's paginated REST API.

mod client;
mod error;

pub use client::LedgerApiClient;
pub use error::{LedgerClientError, Result};
