//! Sync orchestrator: throttle, lock, walk, reconcile.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use log::{debug, error, info, warn};

use crate::documents::{DocumentRepositoryTrait, DocumentStream};
use crate::errors::{DatabaseError, Error};
use crate::Result;

use super::{
    apply_remote_fields, map_line_items, match_record, AccessTokenProvider, LedgerPageSource,
    RawLedgerRecord, StreamKey, SyncConfig, SyncCursorStore, SyncOutcome, SyncRunError,
};

/// The remote ledger synchronization engine. One instance serves all
/// streams; per-stream mutual exclusion lives in the cursor store.
pub struct LedgerSyncService {
    repository: Arc<dyn DocumentRepositoryTrait>,
    cursors: Arc<dyn SyncCursorStore>,
    tokens: Arc<dyn AccessTokenProvider>,
    ledger: Arc<dyn LedgerPageSource>,
    config: SyncConfig,
}

impl LedgerSyncService {
    pub fn new(
        repository: Arc<dyn DocumentRepositoryTrait>,
        cursors: Arc<dyn SyncCursorStore>,
        tokens: Arc<dyn AccessTokenProvider>,
        ledger: Arc<dyn LedgerPageSource>,
        config: SyncConfig,
    ) -> Self {
        Self {
            repository,
            cursors,
            tokens,
            ledger,
            config,
        }
    }

    /// Sole entry point. Refreshes the stream's local mirror unless a recent
    /// successful sync exists or another run holds the stream lock.
    ///
    /// Never fails on run errors: a failed walk yields `SyncStatus::Error`
    /// with the prior timestamp, since stale-but-available local data beats
    /// no data. The lock is released on every path after acquisition.
    pub async fn sync_if_stale(&self, key: &StreamKey) -> Result<SyncOutcome> {
        let last_synced_at = self.cursors.last_synced_at(key)?;

        if let Some(synced_at) = last_synced_at {
            let throttle = chrono::Duration::milliseconds(
                self.config.throttle_window.as_millis() as i64,
            );
            if Utc::now() - synced_at < throttle {
                debug!(
                    "[LedgerSync] Skipping {}: synced {} within throttle window",
                    key.cache_key(),
                    synced_at
                );
                return Ok(SyncOutcome::throttled(synced_at));
            }
        }

        let Some(lock_token) = self
            .cursors
            .try_acquire_lock(key, self.config.lock_ttl)
            .await?
        else {
            debug!(
                "[LedgerSync] Skipping {}: another sync is in flight",
                key.cache_key()
            );
            return Ok(SyncOutcome::locked(last_synced_at));
        };

        // Everything between acquire and release folds failures into the
        // outcome, and a panic in the run is caught and re-raised after the
        // release, so the release below runs on every path.
        let outcome = AssertUnwindSafe(self.run_locked(key, last_synced_at))
            .catch_unwind()
            .await;

        if let Err(err) = self.cursors.release_lock(key, &lock_token).await {
            warn!(
                "[LedgerSync] Failed to release lock for {}: {}",
                key.cache_key(),
                err
            );
        }

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn run_locked(
        &self,
        key: &StreamKey,
        last_synced_at: Option<chrono::DateTime<Utc>>,
    ) -> SyncOutcome {
        let token = match self
            .tokens
            .get_valid_access_token(key.principal.as_deref(), key.stream.as_str())
            .await
        {
            Some(token) => token,
            None => {
                warn!(
                    "[LedgerSync] No valid credential for {}; leaving cursor untouched",
                    key.cache_key()
                );
                return SyncOutcome::unauthorized(last_synced_at);
            }
        };

        match self.walk_and_reconcile(key, &token).await {
            Ok(count) => {
                let now = Utc::now();
                if let Err(err) = self.cursors.record_synced_at(key, now).await {
                    error!(
                        "[LedgerSync] Synced {} but failed to record timestamp: {}",
                        key.cache_key(),
                        err
                    );
                    return SyncOutcome::error(err.to_string(), last_synced_at);
                }
                info!(
                    "[LedgerSync] Synced {}: {} records",
                    key.cache_key(),
                    count
                );
                SyncOutcome::synced(count, now)
            }
            Err(err) => {
                error!(
                    "[LedgerSync] Sync of {} failed, cursor untouched: {}",
                    key.cache_key(),
                    err
                );
                SyncOutcome::error(err.to_string(), last_synced_at)
            }
        }
    }

    /// Walk every page of the stream, upserting each record, then tombstone
    /// local records absent from the walk. A fetch failure aborts before
    /// reconciliation: no partial tombstoning ever happens.
    async fn walk_and_reconcile(
        &self,
        key: &StreamKey,
        token: &str,
    ) -> std::result::Result<usize, SyncRunError> {
        let mut seen_remote_ids: HashSet<String> = HashSet::new();
        let mut processed = 0usize;
        let mut page = 1u32;

        loop {
            let envelope = self
                .ledger
                .fetch_page(token, key.stream, page, self.config.page_size)
                .await?;

            for raw in &envelope.data {
                self.upsert_record(key.stream, raw, token, page, &mut seen_remote_ids)
                    .await?;
                processed += 1;
            }

            let pagination = envelope.pagination;
            if envelope.data.is_empty() || pagination.current_page >= pagination.total_pages {
                break;
            }
            page = pagination.current_page + 1;
        }

        let tombstoned = self.reconcile_tombstones(key.stream, &seen_remote_ids).await?;
        if tombstoned > 0 {
            info!(
                "[LedgerSync] Tombstoned {} {} records no longer present remotely",
                tombstoned,
                key.stream.as_str()
            );
        }

        Ok(processed)
    }

    /// Match, project, persist, and replace line items for one raw record.
    /// Safe to call twice with the same payload: the end state is identical.
    async fn upsert_record(
        &self,
        stream: DocumentStream,
        raw: &RawLedgerRecord,
        token: &str,
        page: u32,
        seen_remote_ids: &mut HashSet<String>,
    ) -> std::result::Result<(), SyncRunError> {
        let remote_id = raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SyncRunError::RecordMissingId { page })?;

        let mut document = match_record(self.repository.as_ref(), stream, remote_id, raw)?;
        apply_remote_fields(&mut document, raw);
        if document.document_number.is_none() {
            document.document_number = Some(format!("{}-{}", stream.number_prefix(), remote_id));
        }

        let saved = self.repository.save(document).await?;
        let document_id = saved.id.ok_or_else(|| {
            SyncRunError::Storage(Error::Database(DatabaseError::Internal(
                "Repository returned a saved document without an id".to_string(),
            )))
        })?;

        self.repository
            .replace_line_items(document_id, map_line_items(raw))
            .await?;

        // Only the raw record carrying a URL triggers a download; a stored
        // URL from an earlier run does not get re-fetched on every pass.
        if let Some(pdf_url) = raw.pdf_url.as_deref() {
            self.fetch_attachment(token, document_id, pdf_url).await;
        }

        seen_remote_ids.insert(remote_id.to_string());
        Ok(())
    }

    /// Opportunistic PDF download; failure never fails the record.
    async fn fetch_attachment(&self, token: &str, document_id: i64, pdf_url: &str) {
        match self.ledger.download_attachment(token, pdf_url).await {
            Ok(content) => {
                if let Err(err) = self.repository.store_attachment(document_id, content).await {
                    warn!(
                        "[LedgerSync] Failed to store attachment for document {}: {}",
                        document_id, err
                    );
                }
            }
            Err(err) => {
                warn!(
                    "[LedgerSync] Attachment download failed for document {}: {}",
                    document_id, err
                );
            }
        }
    }

    /// Soft-delete linked local records the walk did not observe. Runs only
    /// after a complete walk; an empty seen-set tombstones every linked
    /// record, which is the correct reading of an empty remote collection.
    async fn reconcile_tombstones(
        &self,
        stream: DocumentStream,
        seen_remote_ids: &HashSet<String>,
    ) -> std::result::Result<usize, SyncRunError> {
        let stale_ids: Vec<i64> = self
            .repository
            .linked_active_refs(stream)?
            .into_iter()
            .filter(|link| !seen_remote_ids.contains(link.remote_id.trim()))
            .map(|link| link.id)
            .collect();

        if stale_ids.is_empty() {
            return Ok(0);
        }

        let affected = self
            .repository
            .mark_remote_deleted(stale_ids, Utc::now())
            .await?;
        Ok(affected)
    }
}
