//! Sync domain models, raw wire records, and collaborator contracts.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::documents::DocumentStream;

/// Identifies one sync cursor: a document stream, optionally partitioned by
/// the owning principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub stream: DocumentStream,
    pub principal: Option<String>,
}

impl StreamKey {
    pub fn new(stream: DocumentStream) -> Self {
        Self {
            stream,
            principal: None,
        }
    }

    pub fn with_principal(stream: DocumentStream, principal: impl Into<String>) -> Self {
        Self {
            stream,
            principal: Some(principal.into()),
        }
    }

    /// Stable key for the cursor store.
    pub fn cache_key(&self) -> String {
        match self.principal.as_deref() {
            Some(principal) => format!("{}:{}", self.stream.as_str(), principal),
            None => self.stream.as_str().to_string(),
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum elapsed time between two successful syncs of a stream.
    pub throttle_window: Duration,
    /// Safety ceiling on the stream lock. This covers crashed holders, not
    /// expected run duration; a run outliving the TTL may be joined by a
    /// second run, which idempotent upserts make harmless.
    pub lock_ttl: Duration,
    /// Records requested per page.
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_window: Duration::from_secs(5 * 60),
            lock_ttl: Duration::from_secs(30),
            page_size: 50,
        }
    }
}

/// Outcome status of one `sync_if_stale` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Skipped,
    Unauthorized,
    Error,
}

/// Result handed back to presentation-layer callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub status: SyncStatus,
    /// Records processed, present only on a successful run.
    pub count: Option<usize>,
    /// Skip or failure detail ("throttled", "locked", error message).
    pub reason: Option<String>,
    /// Last known-good sync timestamp, stale or fresh.
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncOutcome {
    pub fn synced(count: usize, synced_at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Synced,
            count: Some(count),
            reason: None,
            synced_at: Some(synced_at),
        }
    }

    pub fn throttled(synced_at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Skipped,
            count: None,
            reason: Some("throttled".to_string()),
            synced_at: Some(synced_at),
        }
    }

    pub fn locked(synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SyncStatus::Skipped,
            count: None,
            reason: Some("locked".to_string()),
            synced_at,
        }
    }

    pub fn unauthorized(synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SyncStatus::Unauthorized,
            count: None,
            reason: Some("no valid credential".to_string()),
            synced_at,
        }
    }

    pub fn error(reason: impl Into<String>, synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SyncStatus::Error,
            count: None,
            reason: Some(reason.into()),
            synced_at,
        }
    }
}

/// Failure of a remote page fetch or attachment download.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The response was not the expected envelope shape. Must never be
    /// confused with an empty collection.
    #[error("Malformed page response: {0}")]
    Malformed(String),

    /// Connection, timeout, or other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Failure of a single walk-and-reconcile run.
#[derive(Debug, Error)]
pub enum SyncRunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] crate::errors::Error),

    #[error("Remote record on page {page} has no id")]
    RecordMissingId { page: u32 },
}

/// Pagination metadata reported by the remote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: u32,
}

/// One well-formed page of a remote document collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageEnvelope {
    pub data: Vec<RawLedgerRecord>,
    pub pagination: PageInfo,
}

/// Raw remote document record. The payload is effectively untyped and
/// partial; every field is optional so that present-vs-absent stays explicit
/// for the field mapper.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLedgerRecord {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub total_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub staff_name: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    /// `None` means the items key was absent from the payload; the mapper
    /// still clears local items in that case, since the remote collection is
    /// the source of truth once linked.
    #[serde(default)]
    pub items: Option<Vec<RawLedgerItem>>,
}

/// Raw remote line item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawLedgerItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub tax_code: Option<String>,
}

/// Remote identifiers arrive as either JSON strings or integers.
fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Text(String),
        Number(i64),
    }

    Ok(Option::<IdRepr>::deserialize(deserializer)?.map(|value| match value {
        IdRepr::Text(text) => text,
        IdRepr::Number(number) => number.to_string(),
    }))
}

/// Monetary values arrive as JSON numbers or numeric strings; anything else
/// maps to absent rather than failing the record.
fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DecimalRepr {
        Number(f64),
        Text(String),
    }

    Ok(
        Option::<DecimalRepr>::deserialize(deserializer)?.and_then(|value| match value {
            DecimalRepr::Number(number) => Decimal::from_f64_retain(number),
            DecimalRepr::Text(text) => text.trim().parse::<Decimal>().ok(),
        }),
    )
}

fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FloatRepr {
        Number(f64),
        Text(String),
    }

    Ok(
        Option::<FloatRepr>::deserialize(deserializer)?.and_then(|value| match value {
            FloatRepr::Number(number) => Some(number),
            FloatRepr::Text(text) => text.trim().parse::<f64>().ok(),
        }),
    )
}

/// Token issuance/refresh capability. `None` means "treat as unauthorized,
/// do not retry within this run"; refresh logic lives behind this seam.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn get_valid_access_token(&self, principal: Option<&str>, scope: &str)
        -> Option<String>;
}

/// Remote ledger read capability consumed by the pagination walker.
#[async_trait]
pub trait LedgerPageSource: Send + Sync {
    async fn fetch_page(
        &self,
        token: &str,
        stream: DocumentStream,
        page: u32,
        page_size: u32,
    ) -> Result<PageEnvelope, FetchError>;

    async fn download_attachment(&self, token: &str, url: &str) -> Result<Vec<u8>, FetchError>;
}
