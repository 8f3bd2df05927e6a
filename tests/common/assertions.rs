//! Custom assertions for document and contingency state

use dte_transmitter::storage::{ContingencyStatus, DocumentRecord, DocumentStatus, SqliteStore};
use uuid::Uuid;

/// Assert a document exists with the given status and return it
pub fn assert_document_status(store: &SqliteStore, id: Uuid, expected: DocumentStatus) -> DocumentRecord {
    let doc = store
        .get_document(id)
        .expect("Failed to read document")
        .unwrap_or_else(|| panic!("document {} not found", id));
    assert_eq!(
        doc.status, expected,
        "document {} is {} (error: {:?})",
        id, doc.status, doc.error_message
    );
    doc
}

/// Assert the stored body carries the authority's reception stamp
pub fn assert_stamped(doc: &DocumentRecord, stamp: &str) {
    assert_eq!(doc.reception_stamp.as_deref(), Some(stamp));
    assert_eq!(doc.unsigned_payload["selloRecibido"], stamp);
}

/// Assert the document's queue history, oldest first
pub fn assert_contingency_statuses(store: &SqliteStore, id: Uuid, expected: &[ContingencyStatus]) {
    let records = store
        .contingency_for_document(id)
        .expect("Failed to read contingency records");
    let statuses: Vec<ContingencyStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(statuses, expected, "contingency history of {}", id);
}

/// Sequence part of a `DTE-tt-EEEEPPPP-YYYYNNNNNNNNNNN` control number
pub fn control_sequence(control_number: &str) -> u64 {
    let numeric = control_number
        .rsplit('-')
        .next()
        .expect("control number has a numeric part");
    assert_eq!(numeric.len(), 15, "bad control number {}", control_number);
    numeric[4..].parse().expect("numeric sequence")
}
