// File: src/storage/sqlite/contingency.rs

use super::documents::{replace_signed_payload_in, transition_in, DocumentStatus, TransitionDetails};
use super::store::{from_nanos, now_nanos, SqliteStore};
use crate::document::{ContingencyReason, DocumentType, Environment};
use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContingencyStatus {
    Pending,
    Processed,
    Failed,
}

impl ContingencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContingencyStatus::Pending => "pending",
            ContingencyStatus::Processed => "processed",
            ContingencyStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ContingencyStatus::Pending),
            "processed" => Some(ContingencyStatus::Processed),
            "failed" => Some(ContingencyStatus::Failed),
            _ => None,
        }
    }
}

/// Everything needed to mutate and re-sign a document later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyPayload {
    pub document_id: Uuid,
    pub signed_token: String,
    /// Body before signing; the retransmission job rewrites its identification block
    pub unsigned_payload: Value,
    pub taxpayer_tax_id: String,
    pub environment: Environment,
    pub schema_version: u32,
    pub contingency_reason_code: u8,
    pub contingency_reason_text: String,
    pub original_error: Option<String>,
    pub stored_at: DateTime<Utc>,
}

impl ContingencyPayload {
    pub fn reason(&self) -> ContingencyReason {
        ContingencyReason {
            code: self.contingency_reason_code,
            text: self.contingency_reason_text.clone(),
        }
    }
}

/// Retry-queue entry
#[derive(Debug, Clone)]
pub struct ContingencyRecord {
    pub contingency_id: i64,
    pub document_id: Uuid,
    pub document_type: DocumentType,
    pub status: ContingencyStatus,
    pub payload: ContingencyPayload,
    /// Number of authority batches that included this record
    pub attempts: u32,
    pub authority_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

const CONTINGENCY_COLUMNS: &str = "contingency_id, document_id, document_type, status, payload, \
     attempts, authority_message, created_at, updated_at, processed_at";

fn corrupt(column: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(column, name.into(), rusqlite::types::Type::Text)
}

fn row_to_contingency(row: &Row) -> rusqlite::Result<ContingencyRecord> {
    let document_id: String = row.get(1)?;
    let document_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let payload: String = row.get(4)?;
    let attempts: i64 = row.get(5)?;
    let processed_at: Option<i64> = row.get(9)?;

    Ok(ContingencyRecord {
        contingency_id: row.get(0)?,
        document_id: document_id.parse().map_err(|_| corrupt(1, "document_id"))?,
        document_type: DocumentType::parse(&document_type)
            .ok_or_else(|| corrupt(2, "document_type"))?,
        status: ContingencyStatus::parse(&status).ok_or_else(|| corrupt(3, "status"))?,
        payload: serde_json::from_str(&payload).map_err(|_| corrupt(4, "payload"))?,
        attempts: attempts as u32,
        authority_message: row.get(6)?,
        created_at: from_nanos(row.get(7)?),
        updated_at: from_nanos(row.get(8)?),
        processed_at: processed_at.map(from_nanos),
    })
}

impl SqliteStore {
    /// Queue a document for retransmission and move it to CONTINGENCY atomically
    pub fn enqueue_contingency(
        &self,
        document_type: DocumentType,
        payload: &ContingencyPayload,
    ) -> ServerResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        transition_in(
            &tx,
            payload.document_id,
            DocumentStatus::Contingency,
            &TransitionDetails {
                error_message: payload.original_error.clone(),
                ..Default::default()
            },
        )?;

        let now = now_nanos();
        tx.execute(
            "INSERT INTO contingency_records (document_id, document_type, taxpayer_tax_id, status, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                payload.document_id.to_string(),
                document_type.code(),
                payload.taxpayer_tax_id,
                ContingencyStatus::Pending.as_str(),
                serde_json::to_string(payload)?,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(id)
    }

    /// Up to `limit` pending records, oldest first
    pub fn pending_contingency(&self, limit: usize) -> ServerResult<Vec<ContingencyRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM contingency_records WHERE status = ?1
             ORDER BY created_at ASC, contingency_id ASC LIMIT ?2",
            CONTINGENCY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![ContingencyStatus::Pending.as_str(), limit as i64],
            row_to_contingency,
        )?;
        rows.map(|r| r.map_err(|e| e.into())).collect()
    }

    /// Get a contingency record by id
    pub fn get_contingency(&self, contingency_id: i64) -> ServerResult<Option<ContingencyRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM contingency_records WHERE contingency_id = ?1",
            CONTINGENCY_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![contingency_id], row_to_contingency)
            .optional()?)
    }

    /// Every contingency record ever created for a document
    pub fn contingency_for_document(&self, document_id: Uuid) -> ServerResult<Vec<ContingencyRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM contingency_records WHERE document_id = ?1 ORDER BY contingency_id ASC",
            CONTINGENCY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![document_id.to_string()], row_to_contingency)?;
        rows.map(|r| r.map_err(|e| e.into())).collect()
    }

    /// Number of records in the given status
    pub fn contingency_count(&self, status: ContingencyStatus) -> ServerResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM contingency_records WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Persist a re-signed payload on the record and on its document
    pub fn store_resigned_payload(
        &self,
        contingency_id: i64,
        payload: &ContingencyPayload,
    ) -> ServerResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE contingency_records SET payload = ?1, updated_at = ?2
             WHERE contingency_id = ?3 AND status = ?4",
            params![
                serde_json::to_string(payload)?,
                now_nanos(),
                contingency_id,
                ContingencyStatus::Pending.as_str(),
            ],
        )?;
        if changed != 1 {
            return Err(ServerError::InvalidArgument(format!(
                "contingency record {} is not pending",
                contingency_id
            )));
        }

        replace_signed_payload_in(
            &tx,
            payload.document_id,
            &payload.unsigned_payload,
            &payload.signed_token,
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Count one more authority batch for each record
    pub fn record_batch_attempt(&self, contingency_ids: &[i64]) -> ServerResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = now_nanos();
        for id in contingency_ids {
            tx.execute(
                "UPDATE contingency_records SET attempts = attempts + 1, updated_at = ?1
                 WHERE contingency_id = ?2",
                params![now, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Authority accepted the document: record Processed, document PROCESSED with stamp
    pub fn mark_contingency_processed(&self, contingency_id: i64, stamp: &str) -> ServerResult<()> {
        self.resolve_contingency(
            contingency_id,
            ContingencyStatus::Processed,
            stamp,
            DocumentStatus::Processed,
            TransitionDetails::stamped(stamp),
        )
    }

    /// Authority rejected the document: record Failed, document REJECTED with message
    pub fn mark_contingency_failed(&self, contingency_id: i64, message: &str) -> ServerResult<()> {
        self.resolve_contingency(
            contingency_id,
            ContingencyStatus::Failed,
            message,
            DocumentStatus::Rejected,
            TransitionDetails::failed(message, vec![]),
        )
    }

    fn resolve_contingency(
        &self,
        contingency_id: i64,
        status: ContingencyStatus,
        authority_message: &str,
        document_status: DocumentStatus,
        details: TransitionDetails,
    ) -> ServerResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let document_id: Option<String> = tx
            .query_row(
                "SELECT document_id FROM contingency_records WHERE contingency_id = ?1 AND status = ?2",
                params![contingency_id, ContingencyStatus::Pending.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let document_id: Uuid = document_id
            .ok_or_else(|| {
                ServerError::InvalidArgument(format!(
                    "contingency record {} is not pending",
                    contingency_id
                ))
            })?
            .parse()
            .map_err(|_| ServerError::Internal("corrupt document id".into()))?;

        let now = now_nanos();
        tx.execute(
            "UPDATE contingency_records
             SET status = ?1, authority_message = ?2, processed_at = ?3, updated_at = ?3
             WHERE contingency_id = ?4",
            params![status.as_str(), authority_message, now, contingency_id],
        )?;

        transition_in(&tx, document_id, document_status, &details)?;

        tx.commit()?;
        Ok(())
    }
}
