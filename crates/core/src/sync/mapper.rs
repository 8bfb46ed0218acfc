//! Field mapper: projects recognized remote fields onto the local schema.

use chrono::{DateTime, NaiveDate};
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::documents::{Document, DocumentLineItem, TaxCategory};

use super::{RawLedgerItem, RawLedgerRecord};

/// Maximum characters of a detail string reused as an item name fallback.
const ITEM_NAME_FALLBACK_MAX_CHARS: usize = 30;

/// Parse a remote date value. The remote ledger emits either a bare date or
/// a full RFC3339 timestamp; anything else is dropped, never an error.
pub fn parse_remote_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Round a remote monetary value to the local integer currency unit.
pub fn round_to_currency_unit(amount: Decimal) -> Option<i64> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Copy recognized present fields from the raw record onto the document.
/// Absent fields leave the local value untouched; an unparseable date is
/// skipped without aborting the record. Always clears the remote tombstone,
/// since a record observed remotely was evidently never gone.
pub fn apply_remote_fields(document: &mut Document, raw: &RawLedgerRecord) {
    if let Some(partner_id) = raw.partner_id.as_deref() {
        document.counterpart_id = Some(partner_id.to_string());
    }
    if let Some(partner_name) = raw.partner_name.as_deref() {
        document.counterpart_name = Some(partner_name.to_string());
    }
    if let Some(title) = raw.title.as_deref().or(raw.document_name.as_deref()) {
        document.title = Some(title.to_string());
    }
    if let Some(value) = raw.issue_date.as_deref() {
        match parse_remote_date(value) {
            Some(date) => document.issue_date = Some(date),
            None => debug!("[LedgerSync] Skipping unparseable issue_date '{}'", value),
        }
    }
    if let Some(value) = raw.due_date.as_deref() {
        match parse_remote_date(value) {
            Some(date) => document.due_date = Some(date),
            None => debug!("[LedgerSync] Skipping unparseable due_date '{}'", value),
        }
    }
    if let Some(amount) = raw.total_amount {
        document.total_amount = round_to_currency_unit(amount);
    }
    if let Some(staff_id) = raw.staff_id.as_deref() {
        document.staff_id = Some(staff_id.to_string());
    }
    if let Some(staff_name) = raw.staff_name.as_deref() {
        document.staff_name = Some(staff_name.to_string());
    }
    if let Some(memo) = raw.memo.as_deref() {
        document.memo = Some(memo.to_string());
    }
    if let Some(pdf_url) = raw.pdf_url.as_deref() {
        document.remote_pdf_url = Some(pdf_url.to_string());
    }
    document.remote_deleted_at = None;
}

/// Map the raw items collection to local line items. An absent items key
/// maps to an empty set: local items are still wiped on upsert because the
/// remote ledger owns document contents once linked.
pub fn map_line_items(raw: &RawLedgerRecord) -> Vec<DocumentLineItem> {
    raw.items
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, item)| map_line_item(item, index))
        .collect()
}

fn map_line_item(item: &RawLedgerItem, index: usize) -> DocumentLineItem {
    DocumentLineItem {
        name: item_name(item, index),
        detail: item.detail.clone().filter(|value| !value.trim().is_empty()),
        quantity: item.quantity.unwrap_or(1.0),
        unit: item.unit.clone(),
        unit_price: item
            .unit_price
            .and_then(round_to_currency_unit)
            .unwrap_or(0),
        tax_category: TaxCategory::from_remote_code(item.tax_code.as_deref()),
    }
}

fn item_name(item: &RawLedgerItem, index: usize) -> String {
    if let Some(name) = item.name.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        return name.to_string();
    }
    if let Some(detail) = item
        .detail
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return detail.chars().take(ITEM_NAME_FALLBACK_MAX_CHARS).collect();
    }
    format!("Item {}", index + 1)
}
