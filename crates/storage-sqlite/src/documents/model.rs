//! Database models for document tables and their domain conversions.
//!
//! Dates are stored as TEXT: bare `%Y-%m-%d` for business dates, RFC3339 for
//! timestamps. A stored value that no longer parses maps to `None` rather
//! than failing the read.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use tallybook_core::documents::{Document, DocumentLineItem, DocumentStream, TaxCategory};
use tallybook_core::errors::{DatabaseError, Error};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(
    Queryable,
    Identifiable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentDB {
    pub id: i64,
    pub stream: String,
    pub remote_id: Option<String>,
    pub document_number: Option<String>,
    pub counterpart_id: Option<String>,
    pub counterpart_name: Option<String>,
    pub title: Option<String>,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<i64>,
    pub staff_id: Option<String>,
    pub staff_name: Option<String>,
    pub memo: Option<String>,
    pub remote_pdf_url: Option<String>,
    pub remote_deleted_at: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::documents)]
pub struct NewDocumentDB {
    pub stream: String,
    pub remote_id: Option<String>,
    pub document_number: Option<String>,
    pub counterpart_id: Option<String>,
    pub counterpart_name: Option<String>,
    pub title: Option<String>,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<i64>,
    pub staff_id: Option<String>,
    pub staff_name: Option<String>,
    pub memo: Option<String>,
    pub remote_pdf_url: Option<String>,
    pub remote_deleted_at: Option<String>,
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::document_line_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentLineItemDB {
    pub id: i64,
    pub document_id: i64,
    pub position: i32,
    pub name: String,
    pub detail: Option<String>,
    pub quantity: f64,
    pub unit: Option<String>,
    pub unit_price: i64,
    pub tax_category: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::document_line_items)]
pub struct NewDocumentLineItemDB {
    pub document_id: i64,
    pub position: i32,
    pub name: String,
    pub detail: Option<String>,
    pub quantity: f64,
    pub unit: Option<String>,
    pub unit_price: i64,
    pub tax_category: String,
}

#[derive(Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::document_attachments)]
pub struct DocumentAttachmentDB {
    pub document_id: i64,
    pub content: Vec<u8>,
    pub fetched_at: String,
}

pub fn enum_to_db<T: serde::Serialize>(value: &T) -> tallybook_core::Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> tallybook_core::Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

fn date_to_db(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn date_from_db(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(v, DATE_FORMAT).ok())
}

fn timestamp_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|ts| ts.to_rfc3339())
}

fn timestamp_from_db(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

impl From<DocumentDB> for Document {
    fn from(db: DocumentDB) -> Self {
        Document {
            id: Some(db.id),
            stream: DocumentStream::from_str_key(&db.stream).unwrap_or(DocumentStream::Quotes),
            remote_id: db.remote_id,
            document_number: db.document_number,
            counterpart_id: db.counterpart_id,
            counterpart_name: db.counterpart_name,
            title: db.title,
            issue_date: date_from_db(db.issue_date.as_deref()),
            due_date: date_from_db(db.due_date.as_deref()),
            total_amount: db.total_amount,
            staff_id: db.staff_id,
            staff_name: db.staff_name,
            memo: db.memo,
            remote_pdf_url: db.remote_pdf_url,
            remote_deleted_at: timestamp_from_db(db.remote_deleted_at.as_deref()),
        }
    }
}

impl From<&Document> for NewDocumentDB {
    fn from(document: &Document) -> Self {
        NewDocumentDB {
            stream: document.stream.as_str().to_string(),
            remote_id: document.remote_id.clone(),
            document_number: document.document_number.clone(),
            counterpart_id: document.counterpart_id.clone(),
            counterpart_name: document.counterpart_name.clone(),
            title: document.title.clone(),
            issue_date: date_to_db(document.issue_date),
            due_date: date_to_db(document.due_date),
            total_amount: document.total_amount,
            staff_id: document.staff_id.clone(),
            staff_name: document.staff_name.clone(),
            memo: document.memo.clone(),
            remote_pdf_url: document.remote_pdf_url.clone(),
            remote_deleted_at: timestamp_to_db(document.remote_deleted_at),
        }
    }
}

/// Build the full changeset row for an update. Fails when the document has
/// no local id yet.
pub fn to_document_db(document: &Document) -> tallybook_core::Result<DocumentDB> {
    let id = document.id.ok_or_else(|| {
        Error::Database(DatabaseError::Internal(
            "Cannot update a document without an id".to_string(),
        ))
    })?;
    let new: NewDocumentDB = document.into();
    Ok(DocumentDB {
        id,
        stream: new.stream,
        remote_id: new.remote_id,
        document_number: new.document_number,
        counterpart_id: new.counterpart_id,
        counterpart_name: new.counterpart_name,
        title: new.title,
        issue_date: new.issue_date,
        due_date: new.due_date,
        total_amount: new.total_amount,
        staff_id: new.staff_id,
        staff_name: new.staff_name,
        memo: new.memo,
        remote_pdf_url: new.remote_pdf_url,
        remote_deleted_at: new.remote_deleted_at,
    })
}

impl From<DocumentLineItemDB> for DocumentLineItem {
    fn from(db: DocumentLineItemDB) -> Self {
        DocumentLineItem {
            name: db.name,
            detail: db.detail,
            quantity: db.quantity,
            unit: db.unit,
            unit_price: db.unit_price,
            tax_category: enum_from_db(&db.tax_category).unwrap_or(TaxCategory::Standard),
        }
    }
}

pub fn to_line_item_db(
    document_id: i64,
    position: i32,
    item: &DocumentLineItem,
) -> tallybook_core::Result<NewDocumentLineItemDB> {
    Ok(NewDocumentLineItemDB {
        document_id,
        position,
        name: item.name.clone(),
        detail: item.detail.clone(),
        quantity: item.quantity,
        unit: item.unit.clone(),
        unit_price: item.unit_price,
        tax_category: enum_to_db(&item.tax_category)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_category_round_trips_through_text_column() {
        for category in [
            TaxCategory::Standard,
            TaxCategory::Reduced,
            TaxCategory::Exempt,
            TaxCategory::NonTaxable,
        ] {
            let text = enum_to_db(&category).expect("serialize");
            assert_eq!(enum_from_db::<TaxCategory>(&text).expect("parse"), category);
        }
        assert_eq!(enum_to_db(&TaxCategory::NonTaxable).unwrap(), "non_taxable");
    }

    #[test]
    fn unparseable_stored_date_reads_as_none() {
        let db = DocumentDB {
            id: 1,
            stream: "quotes".to_string(),
            remote_id: None,
            document_number: None,
            counterpart_id: None,
            counterpart_name: None,
            title: None,
            issue_date: Some("garbage".to_string()),
            due_date: Some("2026-04-30".to_string()),
            total_amount: None,
            staff_id: None,
            staff_name: None,
            memo: None,
            remote_pdf_url: None,
            remote_deleted_at: None,
        };
        let document = Document::from(db);
        assert_eq!(document.issue_date, None);
        assert_eq!(
            document.due_date,
            NaiveDate::from_ymd_opt(2026, 4, 30)
        );
    }
}
