// File: src/storage/sqlite/documents.rs

use super::store::{from_nanos, now_nanos, SqliteStore};
use crate::document::body::RECEPTION_STAMP_KEY;
use crate::document::DocumentType;
use crate::error::{ServerError, ServerResult, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentStatus {
    /// Signed, not yet answered by the authority
    Signed,
    Processed,
    Rejected,
    /// Queued for retransmission
    Contingency,
    /// Failed without an authority rejection and without a retryable cause
    TransmissionError,
    /// Unexpected failure after the document was persisted
    Error,
    Invalidated,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Signed => "SIGNED",
            DocumentStatus::Processed => "PROCESSED",
            DocumentStatus::Rejected => "REJECTED",
            DocumentStatus::Contingency => "CONTINGENCY",
            DocumentStatus::TransmissionError => "TRANSMISSION_ERROR",
            DocumentStatus::Error => "ERROR",
            DocumentStatus::Invalidated => "INVALIDATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGNED" => Some(DocumentStatus::Signed),
            "PROCESSED" => Some(DocumentStatus::Processed),
            "REJECTED" => Some(DocumentStatus::Rejected),
            "CONTINGENCY" => Some(DocumentStatus::Contingency),
            "TRANSMISSION_ERROR" => Some(DocumentStatus::TransmissionError),
            "ERROR" => Some(DocumentStatus::Error),
            "INVALIDATED" => Some(DocumentStatus::Invalidated),
            _ => None,
        }
    }

    /// States from which a document may move into `self`
    pub fn allowed_predecessors(&self) -> &'static [DocumentStatus] {
        use DocumentStatus::*;
        match self {
            Signed => &[],
            Processed | Rejected => &[Signed, Contingency],
            Contingency | TransmissionError => &[Signed],
            Error => &[Signed, Contingency],
            Invalidated => &[Processed],
        }
    }

    pub fn can_transition_to(&self, to: DocumentStatus) -> bool {
        to.allowed_predecessors().contains(self)
    }

    /// No further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Rejected
                | DocumentStatus::TransmissionError
                | DocumentStatus::Error
                | DocumentStatus::Invalidated
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document row
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: Uuid,
    pub taxpayer_id: String,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub unsigned_payload: Value,
    pub signed_token: Option<String>,
    pub control_number: String,
    pub total_amount: f64,
    pub reception_stamp: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A freshly signed document, persisted as SIGNED
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_id: Uuid,
    pub taxpayer_id: String,
    pub document_type: DocumentType,
    pub unsigned_payload: Value,
    pub signed_token: String,
    pub control_number: String,
    pub total_amount: f64,
}

/// Data recorded alongside a status change
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    /// Injected into the stored payload and kept in its own column
    pub reception_stamp: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Vec<String>,
}

impl TransitionDetails {
    pub fn stamped(stamp: impl Into<String>) -> Self {
        Self {
            reception_stamp: Some(stamp.into()),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            error_details: details,
            ..Default::default()
        }
    }
}

const DOCUMENT_COLUMNS: &str = "document_id, taxpayer_id, document_type, status, unsigned_payload, \
     signed_token, control_number, total_amount, reception_stamp, error_message, error_details, \
     created_at, updated_at";

fn corrupt(column: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(column, name.into(), rusqlite::types::Type::Text)
}

fn row_to_document(row: &Row) -> rusqlite::Result<DocumentRecord> {
    let document_id: String = row.get(0)?;
    let document_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let unsigned_payload: String = row.get(4)?;
    let error_details: Option<String> = row.get(10)?;

    Ok(DocumentRecord {
        document_id: document_id.parse().map_err(|_| corrupt(0, "document_id"))?,
        taxpayer_id: row.get(1)?,
        document_type: DocumentType::parse(&document_type)
            .ok_or_else(|| corrupt(2, "document_type"))?,
        status: DocumentStatus::parse(&status).ok_or_else(|| corrupt(3, "status"))?,
        unsigned_payload: serde_json::from_str(&unsigned_payload)
            .map_err(|_| corrupt(4, "unsigned_payload"))?,
        signed_token: row.get(5)?,
        control_number: row.get(6)?,
        total_amount: row.get(7)?,
        reception_stamp: row.get(8)?,
        error_message: row.get(9)?,
        error_details: error_details
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        created_at: from_nanos(row.get(11)?),
        updated_at: from_nanos(row.get(12)?),
    })
}

/// Read a document with an existing connection or transaction
pub(crate) fn load_document(conn: &Connection, id: Uuid) -> ServerResult<Option<DocumentRecord>> {
    let sql = format!(
        "SELECT {} FROM documents WHERE document_id = ?1",
        DOCUMENT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id.to_string()], row_to_document)
        .optional()?)
}

/// Apply a state-machine transition with an existing connection or transaction
///
/// The update is conditional on the status read just before, so a concurrent
/// writer can never be silently overwritten.
pub(crate) fn transition_in(
    conn: &Connection,
    id: Uuid,
    to: DocumentStatus,
    details: &TransitionDetails,
) -> ServerResult<DocumentRecord> {
    let current = load_document(conn, id)?.ok_or(ServerError::DocumentNotFound(id))?;

    if !current.status.can_transition_to(to) {
        return Err(ServerError::InvalidTransition {
            document_id: id,
            from: current.status,
            to,
        });
    }

    let mut payload = current.unsigned_payload.clone();
    if let (Some(stamp), Some(obj)) = (&details.reception_stamp, payload.as_object_mut()) {
        obj.insert(RECEPTION_STAMP_KEY.to_string(), Value::String(stamp.clone()));
    }

    let error_details = if details.error_details.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&details.error_details)?)
    };

    let changed = conn.execute(
        "UPDATE documents
         SET status = ?1,
             unsigned_payload = ?2,
             reception_stamp = COALESCE(?3, reception_stamp),
             error_message = COALESCE(?4, error_message),
             error_details = COALESCE(?5, error_details),
             updated_at = ?6
         WHERE document_id = ?7 AND status = ?8",
        params![
            to.as_str(),
            serde_json::to_string(&payload)?,
            details.reception_stamp,
            details.error_message,
            error_details,
            now_nanos(),
            id.to_string(),
            current.status.as_str(),
        ],
    )?;

    if changed != 1 {
        return Err(ServerError::InvalidTransition {
            document_id: id,
            from: current.status,
            to,
        });
    }

    load_document(conn, id)?.ok_or(ServerError::DocumentNotFound(id))
}

/// Replace the payload and signed token of a document awaiting retransmission
pub(crate) fn replace_signed_payload_in(
    conn: &Connection,
    id: Uuid,
    unsigned_payload: &Value,
    signed_token: &str,
) -> ServerResult<()> {
    let changed = conn.execute(
        "UPDATE documents SET unsigned_payload = ?1, signed_token = ?2, updated_at = ?3
         WHERE document_id = ?4 AND status = ?5",
        params![
            serde_json::to_string(unsigned_payload)?,
            signed_token,
            now_nanos(),
            id.to_string(),
            DocumentStatus::Contingency.as_str(),
        ],
    )?;

    if changed != 1 {
        let current = load_document(conn, id)?.ok_or(ServerError::DocumentNotFound(id))?;
        return Err(ServerError::InvalidState {
            document_id: id,
            status: current.status,
        });
    }
    Ok(())
}

impl SqliteStore {
    /// Persist a signed document as SIGNED
    pub fn insert_document(&self, doc: &NewDocument) -> ServerResult<DocumentRecord> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if load_document(&tx, doc.document_id)?.is_some() {
            return Err(ServerError::DuplicateDocument(doc.document_id));
        }

        let now = now_nanos();
        tx.execute(
            "INSERT INTO documents (document_id, taxpayer_id, document_type, status, unsigned_payload,
                                    signed_token, control_number, total_amount, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                doc.document_id.to_string(),
                doc.taxpayer_id,
                doc.document_type.code(),
                DocumentStatus::Signed.as_str(),
                serde_json::to_string(&doc.unsigned_payload)?,
                doc.signed_token,
                doc.control_number,
                doc.total_amount,
                now,
            ],
        )?;

        let record = load_document(&tx, doc.document_id)?.ok_or_else(|| {
            ServerError::Storage(StorageError::TransactionFailed(
                "inserted document not readable".into(),
            ))
        })?;
        tx.commit()?;
        Ok(record)
    }

    /// Get a document by id
    pub fn get_document(&self, id: Uuid) -> ServerResult<Option<DocumentRecord>> {
        let conn = self.get_conn()?;
        load_document(&conn, id)
    }

    /// Move a document to a new status, recording stamp or error details
    pub fn transition_document(
        &self,
        id: Uuid,
        to: DocumentStatus,
        details: &TransitionDetails,
    ) -> ServerResult<DocumentRecord> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let record = transition_in(&tx, id, to, details)?;
        tx.commit()?;
        Ok(record)
    }

    /// Documents currently in the given status, oldest first
    pub fn documents_with_status(&self, status: DocumentStatus) -> ServerResult<Vec<DocumentRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM documents WHERE status = ?1 ORDER BY created_at ASC",
            DOCUMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![status.as_str()], row_to_document)?;
        rows.map(|r| r.map_err(|e| e.into())).collect()
    }

    /// Number of stored documents
    pub fn document_count(&self) -> ServerResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
