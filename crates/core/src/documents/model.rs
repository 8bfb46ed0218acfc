//! Document, line item, and tax category models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One logical remote document collection, synchronized independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStream {
    Quotes,
    Billings,
}

impl DocumentStream {
    /// Storage key and remote API path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quotes => "quotes",
            Self::Billings => "billings",
        }
    }

    /// Prefix for deterministic fallback document numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            Self::Quotes => "EST",
            Self::Billings => "BIL",
        }
    }

    pub fn from_str_key(value: &str) -> Option<Self> {
        match value {
            "quotes" => Some(Self::Quotes),
            "billings" => Some(Self::Billings),
            _ => None,
        }
    }
}

/// Local tax category vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    Standard,
    Reduced,
    Exempt,
    NonTaxable,
}

impl TaxCategory {
    /// Fixed translation table from the remote ledger's tax-code vocabulary.
    /// Unrecognized or absent codes fall back to the standard category.
    pub fn from_remote_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("tax_10") | Some("standard") | Some("standard_10") => Self::Standard,
            Some("tax_8") | Some("reduced") | Some("reduced_8") => Self::Reduced,
            Some("tax_exempt") | Some("exempt") => Self::Exempt,
            Some("non_taxable") | Some("out_of_scope") => Self::NonTaxable,
            _ => Self::Standard,
        }
    }
}

/// Local authoritative record for a business document (estimate or billing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Local primary key; `None` until first save.
    pub id: Option<i64>,
    pub stream: DocumentStream,
    /// Opaque key from the remote ledger; unique per stream when present.
    pub remote_id: Option<String>,
    /// Human-readable number, locally generated or remote-assigned.
    pub document_number: Option<String>,
    pub counterpart_id: Option<String>,
    pub counterpart_name: Option<String>,
    pub title: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Monetary total in the local integer currency unit.
    pub total_amount: Option<i64>,
    pub staff_id: Option<String>,
    pub staff_name: Option<String>,
    pub memo: Option<String>,
    pub remote_pdf_url: Option<String>,
    /// Set when the linked remote record disappeared from the remote
    /// collection; distinct from any local soft delete.
    pub remote_deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    /// A fresh remote-originated document, before field projection.
    pub fn remote_seed(
        stream: DocumentStream,
        remote_id: &str,
        document_number: Option<String>,
    ) -> Self {
        Self {
            id: None,
            stream,
            remote_id: Some(remote_id.to_string()),
            document_number,
            counterpart_id: None,
            counterpart_name: None,
            title: None,
            issue_date: None,
            due_date: None,
            total_amount: None,
            staff_id: None,
            staff_name: None,
            memo: None,
            remote_pdf_url: None,
            remote_deleted_at: None,
        }
    }
}

/// Line item owned by a document. The remote ledger provides items as a
/// complete snapshot per document, so the whole set is replaced on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLineItem {
    pub name: String,
    pub detail: Option<String>,
    pub quantity: f64,
    pub unit: Option<String>,
    /// Unit price in the local integer currency unit.
    pub unit_price: i64,
    pub tax_category: TaxCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_code_translation_table() {
        assert_eq!(
            TaxCategory::from_remote_code(Some("tax_10")),
            TaxCategory::Standard
        );
        assert_eq!(
            TaxCategory::from_remote_code(Some("reduced_8")),
            TaxCategory::Reduced
        );
        assert_eq!(
            TaxCategory::from_remote_code(Some("tax_exempt")),
            TaxCategory::Exempt
        );
        assert_eq!(
            TaxCategory::from_remote_code(Some("out_of_scope")),
            TaxCategory::NonTaxable
        );
    }

    #[test]
    fn unknown_or_missing_tax_code_defaults_to_standard() {
        assert_eq!(
            TaxCategory::from_remote_code(Some("mystery_code")),
            TaxCategory::Standard
        );
        assert_eq!(TaxCategory::from_remote_code(None), TaxCategory::Standard);
    }

    #[test]
    fn stream_serialization_matches_storage_keys() {
        for stream in [DocumentStream::Quotes, DocumentStream::Billings] {
            let json = serde_json::to_string(&stream).expect("serialize stream");
            assert_eq!(json, format!("\"{}\"", stream.as_str()));
            assert_eq!(DocumentStream::from_str_key(stream.as_str()), Some(stream));
        }
    }
}
