//! Business document domain models and the repository contract.

mod model;

pub use model::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// Reference to a locally stored document that is linked to a remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedDocumentRef {
    pub id: i64,
    pub remote_id: String,
}

/// Persistence contract for business documents.
///
/// Reads are synchronous against the connection pool; writes go through the
/// storage crate's single-writer actor, hence async.
#[async_trait]
pub trait DocumentRepositoryTrait: Send + Sync {
    fn find_by_remote_id(
        &self,
        stream: DocumentStream,
        remote_id: &str,
    ) -> Result<Option<Document>>;

    /// First active document in the stream with the given number and no
    /// remote linkage yet. Tombstoned and already-linked rows are excluded.
    fn find_unlinked_by_number(
        &self,
        stream: DocumentStream,
        number: &str,
    ) -> Result<Option<Document>>;

    /// All documents in the stream with a remote id and no remote tombstone.
    fn linked_active_refs(&self, stream: DocumentStream) -> Result<Vec<LinkedDocumentRef>>;

    fn line_items(&self, document_id: i64) -> Result<Vec<DocumentLineItem>>;

    /// Insert or update, returning the stored document with its id set.
    async fn save(&self, document: Document) -> Result<Document>;

    /// Delete all line items for the document and insert the given set.
    async fn replace_line_items(
        &self,
        document_id: i64,
        items: Vec<DocumentLineItem>,
    ) -> Result<()>;

    /// Tombstone the given documents as remotely deleted and clear their
    /// remote PDF links. Returns the number of rows affected.
    async fn mark_remote_deleted(
        &self,
        document_ids: Vec<i64>,
        deleted_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Store the downloaded PDF for a document, replacing any previous copy.
    async fn store_attachment(&self, document_id: i64, content: Vec<u8>) -> Result<()>;
}
