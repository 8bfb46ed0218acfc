use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;

use tallybook_core::documents::{
    Document, DocumentLineItem, DocumentRepositoryTrait, DocumentStream, LinkedDocumentRef,
};
use tallybook_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{document_attachments, document_line_items, documents};

use super::model::{
    to_document_db, to_line_item_db, DocumentAttachmentDB, DocumentDB, DocumentLineItemDB,
    NewDocumentDB,
};

pub struct DocumentRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl DocumentRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        DocumentRepository { pool, writer }
    }
}

#[async_trait]
impl DocumentRepositoryTrait for DocumentRepository {
    fn find_by_remote_id(
        &self,
        stream: DocumentStream,
        remote_id: &str,
    ) -> Result<Option<Document>> {
        let mut conn = get_connection(&self.pool)?;
        let row = documents::table
            .filter(documents::stream.eq(stream.as_str()))
            .filter(documents::remote_id.eq(remote_id))
            .first::<DocumentDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(Document::from))
    }

    fn find_unlinked_by_number(
        &self,
        stream: DocumentStream,
        number: &str,
    ) -> Result<Option<Document>> {
        let mut conn = get_connection(&self.pool)?;
        let row = documents::table
            .filter(documents::stream.eq(stream.as_str()))
            .filter(documents::document_number.eq(number))
            .filter(documents::remote_id.is_null())
            .filter(documents::remote_deleted_at.is_null())
            .order(documents::id.asc())
            .first::<DocumentDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(Document::from))
    }

    fn linked_active_refs(&self, stream: DocumentStream) -> Result<Vec<LinkedDocumentRef>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = documents::table
            .filter(documents::stream.eq(stream.as_str()))
            .filter(documents::remote_id.is_not_null())
            .filter(documents::remote_deleted_at.is_null())
            .select((documents::id, documents::remote_id))
            .load::<(i64, Option<String>)>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, remote_id)| Some(LinkedDocumentRef { id, remote_id: remote_id? }))
            .collect())
    }

    fn line_items(&self, document_id: i64) -> Result<Vec<DocumentLineItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = document_line_items::table
            .filter(document_line_items::document_id.eq(document_id))
            .order(document_line_items::position.asc())
            .load::<DocumentLineItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(DocumentLineItem::from).collect())
    }

    async fn save(&self, document: Document) -> Result<Document> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Document> {
                match document.id {
                    Some(doc_id) => {
                        let changes = to_document_db(&document)?;
                        diesel::update(documents::table.find(doc_id))
                            .set(&changes)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        let row = documents::table
                            .find(doc_id)
                            .first::<DocumentDB>(conn)
                            .map_err(StorageError::from)?;
                        Ok(Document::from(row))
                    }
                    None => {
                        let new_row: NewDocumentDB = (&document).into();
                        let row = diesel::insert_into(documents::table)
                            .values(&new_row)
                            .returning(DocumentDB::as_returning())
                            .get_result::<DocumentDB>(conn)
                            .map_err(StorageError::from)?;
                        Ok(Document::from(row))
                    }
                }
            })
            .await
    }

    async fn replace_line_items(
        &self,
        document_id: i64,
        items: Vec<DocumentLineItem>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(
                    document_line_items::table
                        .filter(document_line_items::document_id.eq(document_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;

                let rows = items
                    .iter()
                    .enumerate()
                    .map(|(position, item)| to_line_item_db(document_id, position as i32, item))
                    .collect::<Result<Vec<_>>>()?;
                if !rows.is_empty() {
                    diesel::insert_into(document_line_items::table)
                        .values(&rows)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(())
            })
            .await
    }

    async fn mark_remote_deleted(
        &self,
        document_ids: Vec<i64>,
        deleted_at: DateTime<Utc>,
    ) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let affected = diesel::update(
                    documents::table.filter(documents::id.eq_any(document_ids)),
                )
                .set((
                    documents::remote_deleted_at.eq(Some(deleted_at.to_rfc3339())),
                    documents::remote_pdf_url.eq(None::<String>),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(affected)
            })
            .await
    }

    async fn store_attachment(&self, document_id: i64, content: Vec<u8>) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let row = DocumentAttachmentDB {
                    document_id,
                    content,
                    fetched_at: Utc::now().to_rfc3339(),
                };
                diesel::insert_into(document_attachments::table)
                    .values(&row)
                    .on_conflict(document_attachments::document_id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
