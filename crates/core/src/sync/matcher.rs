//! Entity matcher: resolves a raw remote record to its local document.

use log::info;

use crate::documents::{Document, DocumentRepositoryTrait, DocumentStream};
use crate::Result;

use super::RawLedgerRecord;

/// Strip the CRM infix the remote ledger sometimes embeds in document
/// numbers: `"EST-CRM-0007"` becomes `"EST-0007"`, a bare `CRM` substring is
/// removed. Returns the input unchanged when no marker is present.
pub fn normalize_document_number(number: &str) -> String {
    if number.contains("-CRM-") {
        return number.replace("-CRM-", "-");
    }
    if number.contains("CRM") {
        return number.replace("CRM", "");
    }
    number.to_string()
}

/// Resolve the local document a raw record corresponds to. Ordered
/// strategies, first hit wins:
///
/// 1. exact `remote_id` match;
/// 2. exact `document_number` match against unlinked active documents,
///    linking the hit;
/// 3. retry (2) with the normalized number;
/// 4. construct a new document seeded with the normalized (or raw) number,
///    or with only the remote id.
///
/// The returned document is never persisted here; linkage (setting
/// `remote_id` on an existing document) is logged as an auditable event.
pub fn match_record(
    repository: &dyn DocumentRepositoryTrait,
    stream: DocumentStream,
    remote_id: &str,
    raw: &RawLedgerRecord,
) -> Result<Document> {
    if let Some(document) = repository.find_by_remote_id(stream, remote_id)? {
        return Ok(document);
    }

    let number = raw
        .document_number
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let Some(number) = number else {
        return Ok(Document::remote_seed(stream, remote_id, None));
    };

    if let Some(document) = repository.find_unlinked_by_number(stream, number)? {
        return Ok(link(document, stream, remote_id, number));
    }

    let normalized = normalize_document_number(number);
    if normalized != number {
        if let Some(document) = repository.find_unlinked_by_number(stream, &normalized)? {
            return Ok(link(document, stream, remote_id, &normalized));
        }
    }

    Ok(Document::remote_seed(stream, remote_id, Some(normalized)))
}

fn link(
    mut document: Document,
    stream: DocumentStream,
    remote_id: &str,
    matched_number: &str,
) -> Document {
    info!(
        "[LedgerSync] Linked local {} document {:?} to remote id {} via number '{}'",
        stream.as_str(),
        document.id,
        remote_id,
        matched_number
    );
    document.remote_id = Some(remote_id.to_string());
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_crm_infix() {
        assert_eq!(normalize_document_number("EST-CRM-0007"), "EST-0007");
        assert_eq!(normalize_document_number("BIL-CRM-0123"), "BIL-0123");
    }

    #[test]
    fn removes_bare_crm_marker() {
        assert_eq!(normalize_document_number("ESTCRM0007"), "EST0007");
    }

    #[test]
    fn leaves_clean_numbers_untouched() {
        assert_eq!(normalize_document_number("EST-0007"), "EST-0007");
    }
}
